use std::io;

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum MarkModelError {
    #[error("Grammar definition error: {0}")]
    Grammar(String),
    #[error("File system error: {0}")]
    Io(String),
    #[error("Linking error: unresolved path '{path}': {message}")]
    Linking { path: String, message: String },
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Markdown model parse error: {0}")]
    Parse(String),
    #[error("Remote schema error: {0}")]
    Remote(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Model validation failed with {count} finding(s):\n{report}")]
    Validation { count: usize, report: String },
}

impl From<JsonError> for MarkModelError {
    fn from(src: JsonError) -> MarkModelError {
        MarkModelError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for MarkModelError {
    fn from(src: UrlParseError) -> MarkModelError {
        MarkModelError::Remote(format!("Invalid URL: {src}"))
    }
}

impl From<RegexError> for MarkModelError {
    fn from(src: RegexError) -> MarkModelError {
        MarkModelError::Grammar(format!("Regex compile failed: {src}"))
    }
}

impl From<io::Error> for MarkModelError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => MarkModelError::NotFound(format!("{x}")),
            _ => MarkModelError::Io(format!("IOError: {}", x.kind())),
        }
    }
}
