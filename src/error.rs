use thiserror::Error;

use crate::location::Location;

/// Phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Lex,
    Parse,
    Runtime,
}

/// Located diagnostic raised by every phase of the pipeline.
///
/// Renders as `path:line:column: message`; the leading `path:` is omitted
/// when no path is known.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{}", render_diagnostic(.path, .location, .message))]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub path: String,
    pub location: Location,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Io,
            message: message.into(),
            path: path.into(),
            location: Location::start(),
        }
    }

    pub fn lex(message: impl Into<String>, path: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ErrorKind::Lex,
            message: message.into(),
            path: path.into(),
            location,
        }
    }

    pub fn parse(message: impl Into<String>, path: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            path: path.into(),
            location,
        }
    }

    pub fn runtime(message: impl Into<String>, path: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            message: message.into(),
            path: path.into(),
            location,
        }
    }
}

fn render_diagnostic(path: &str, location: &Location, message: &str) -> String {
    if path.is_empty() {
        format!("{}:{}: {message}", location.line, location.column)
    } else {
        format!("{path}:{}:{}: {message}", location.line, location.column)
    }
}
