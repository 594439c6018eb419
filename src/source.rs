use std::fs;

use crate::error::{Error, Result};

/// A source buffer paired with the path it was loaded from.
#[derive(Debug, Clone)]
pub struct Source {
    path: String,
    content: String,
}

impl Source {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|error| Error::io(format!("failed to read source file: {error}"), path))?;
        Ok(Self::new(path, content))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
