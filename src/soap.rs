//! SOAP 1.1 envelope wrapping a signed document.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

pub mod ns {
    pub const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    pub const ABRASF: &str = "http://www.abrasf.org.br/ABRASF/arquivos/nfse.xsd";
}

pub mod prefix {
    pub const SOAP: &str = "soap";
}

/// A SOAP envelope whose header and body are embedded verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    header: Option<String>,
    body: String,
}

impl Envelope {
    /// Creates a new envelope around `document`, dropping its XML declaration
    pub fn new(document: impl AsRef<str>) -> Self {
        Self {
            header: None,
            body: strip_declaration(document.as_ref()).to_owned(),
        }
    }

    /// Set the envelope header content
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Returns the header content of the envelope
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Returns the body content of the envelope
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Serialize the envelope, keeping header and body bytes untouched
    pub fn to_xml(&self) -> Result<String, quick_xml::Error> {
        let envelope_tag = format!("{}:Envelope", prefix::SOAP);
        let header_tag = format!("{}:Header", prefix::SOAP);
        let body_tag = format!("{}:Body", prefix::SOAP);
        let xmlns = format!("xmlns:{}", prefix::SOAP);

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new(envelope_tag.as_str()).with_attributes([(xmlns.as_str(), ns::SOAP_ENV)]),
        ))?;

        if let Some(header) = &self.header {
            writer.write_event(Event::Start(BytesStart::new(header_tag.as_str())))?;
            writer.write_event(Event::Text(BytesText::from_escaped(header.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new(header_tag.as_str())))?;
        }

        writer.write_event(Event::Start(BytesStart::new(body_tag.as_str())))?;
        writer.write_event(Event::Text(BytesText::from_escaped(self.body.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(body_tag.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(envelope_tag.as_str())))?;

        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}

/// ABRASF `cabecalho` header block announcing the schema version of the payload
pub fn abrasf_header(data_version: &str) -> String {
    format!(
        "<cabecalho xmlns=\"{}\" versao=\"{data_version}\"><versaoDados>{data_version}</versaoDados></cabecalho>",
        ns::ABRASF
    )
}

fn strip_declaration(document: &str) -> &str {
    let trimmed = document.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
