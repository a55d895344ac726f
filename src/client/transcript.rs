use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use std::fmt;

/// Record of one request/response exchange, laid out like a verbose HTTP trace.
///
/// Only what travels on the wire is recorded; client key material never does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub(crate) fn request(method: &Method, url: &Url, headers: &HeaderMap, body: &str) -> Self {
        let mut transcript = Self::default();
        transcript.lines.push(format!("> {method} {url}"));
        transcript.push_headers('>', headers);
        transcript.lines.push(">".into());
        transcript.lines.push(body.to_owned());
        transcript
    }

    pub(crate) fn response(&mut self, status: StatusCode, headers: &HeaderMap, body: &str) {
        self.lines.push(format!("< {status}"));
        self.push_headers('<', headers);
        self.lines.push("<".into());
        self.lines.push(body.to_owned());
    }

    /// Note a failure that ended the exchange early.
    pub(crate) fn failure(&mut self, error: &impl fmt::Display) {
        self.lines.push(format!("* {error}"));
    }

    fn push_headers(&mut self, marker: char, headers: &HeaderMap) {
        for (name, value) in headers {
            let value = value.to_str().unwrap_or("<binary>");
            self.lines.push(format!("{marker} {name}: {value}"));
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
