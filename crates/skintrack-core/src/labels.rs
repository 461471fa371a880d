//! Severity label vocabulary: one class name per line, line number = class index.

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label file not found: {0}")]
    NotFound(String),
    #[error("reading labels: {0}")]
    Io(#[from] std::io::Error),
    #[error("label file {0} lists no classes")]
    Empty(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn load(path: &str) -> Result<Self, LabelError> {
        if !Path::new(path).exists() {
            return Err(LabelError::NotFound(path.to_string()));
        }
        let labels = Self::parse(&std::fs::read_to_string(path)?);
        if labels.is_empty() {
            return Err(LabelError::Empty(path.to_string()));
        }
        tracing::info!(path, classes = labels.len(), "loaded severity labels");
        Ok(labels)
    }

    /// Parse newline-separated names.
    ///
    /// Trailing blank lines are dropped; blank lines in between keep their
    /// index so ordinals stay aligned with the model output.
    pub fn parse(contents: &str) -> Self {
        let mut names: Vec<String> = contents
            .lines()
            .map(|line| line.trim_end_matches('\r').trim().to_string())
            .collect();
        while names.last().is_some_and(|n| n.is_empty()) {
            names.pop();
        }
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_trailing_newline() {
        let labels = LabelSet::parse("clear\nmild\nmoderate\nsevere\n");
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.name(3), Some("severe"));
        assert_eq!(labels.name(4), None);
    }

    #[test]
    fn test_parse_crlf() {
        let labels = LabelSet::parse("papules\r\npustules\r\n");
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["papules", "pustules"]);
    }

    #[test]
    fn test_parse_keeps_interior_blank() {
        let labels = LabelSet::parse("a\n\nc\n\n\n");
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.name(1), Some(""));
        assert_eq!(labels.name(2), Some("c"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = LabelSet::load("/nonexistent/labels.txt");
        assert!(matches!(result, Err(LabelError::NotFound(_))));
    }
}
