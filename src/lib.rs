pub mod client;
pub mod config;
pub mod crypto;
pub mod dsig;
pub mod pki;
pub mod soap;
pub mod telemetry;
pub mod xml;
