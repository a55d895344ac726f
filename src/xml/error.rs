use thiserror::Error;

/// Malformed input detected while parsing or canonicalizing XML
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Namespace prefix '{0}' is not bound in scope")]
    UnboundPrefix(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Malformed(err.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for Error {
    fn from(err: quick_xml::escape::EscapeError) -> Self {
        Error::Malformed(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::Malformed(err.to_string())
    }
}
