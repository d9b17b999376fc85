use std::collections::BTreeMap;
use std::path::PathBuf;

/// Decoded key/value mapping.
pub type EnvMap = BTreeMap<String, String>;

/// A parsed `KEY=VALUE` entry from an env file or input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub source: Option<PathBuf>,
    pub line: u32,
}

/// Summary of the load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_existing: usize,
    pub files_read: usize,
    pub files_skipped: usize,
}

/// Variable expansion behavior for double-quoted and unquoted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Expand `$VAR` and `${VAR}` placeholders.
    #[default]
    Expand,
    /// Keep values as parsed with no expansion.
    Disabled,
}

/// Key validation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyParsingMode {
    /// Any key without `=`, trimmed of surrounding whitespace.
    #[default]
    Lenient,
    /// Only `[A-Za-z0-9_.-]+`.
    Strict,
}

/// Decoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    pub substitution_mode: SubstitutionMode,
    pub key_parsing_mode: KeyParsingMode,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    pub fn key_parsing_mode(mut self, key_parsing_mode: KeyParsingMode) -> Self {
        self.key_parsing_mode = key_parsing_mode;
        self
    }
}
