pub mod cert_utils;
mod certificate;
mod credentials;
mod errors;

pub use certificate::Certificate;
pub use credentials::Credentials;
pub(crate) use credentials::certificate_matches;
pub use errors::PkiError;
