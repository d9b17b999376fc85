use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::env::{EnvLookup, SystemEnv};
use crate::error::{Error, ParseError, ParseErrorKind};
use crate::expand::{expand_template, parse_placeholder};
use crate::model::{EnvMap, Entry, KeyParsingMode, ParseOptions, SubstitutionMode};

/// Parse env entries from UTF-8 text.
///
/// Placeholders fall back to the current process environment.
pub fn parse_str(input: &str) -> Result<Vec<Entry>, Error> {
    parse_str_with(input, ParseOptions::default(), &SystemEnv)
}

/// Parse env entries from UTF-8 text with explicit options and lookup.
pub fn parse_str_with(
    input: &str,
    options: ParseOptions,
    env: &impl EnvLookup,
) -> Result<Vec<Entry>, Error> {
    parse_str_with_source(input, None, options, env).map_err(Error::from)
}

/// Parse env entries from UTF-8 bytes.
pub fn parse_bytes(input: &[u8]) -> Result<Vec<Entry>, Error> {
    parse_bytes_with(input, ParseOptions::default(), &SystemEnv)
}

/// Parse env entries from UTF-8 bytes with explicit options and lookup.
pub fn parse_bytes_with(
    input: &[u8],
    options: ParseOptions,
    env: &impl EnvLookup,
) -> Result<Vec<Entry>, Error> {
    let text = std::str::from_utf8(input)?;
    parse_str_with(text, options, env)
}

/// Parse env entries from a reader, draining it first.
pub fn parse_reader<R: Read>(reader: R) -> Result<Vec<Entry>, Error> {
    parse_reader_with(reader, ParseOptions::default(), &SystemEnv)
}

/// Parse env entries from a reader with explicit options and lookup.
pub fn parse_reader_with<R: Read>(
    mut reader: R,
    options: ParseOptions,
    env: &impl EnvLookup,
) -> Result<Vec<Entry>, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    parse_bytes_with(&buf, options, env)
}

/// Decode env text straight into a map.
pub fn unmarshal(input: &str) -> Result<EnvMap, Error> {
    unmarshal_with(input, ParseOptions::default(), &SystemEnv)
}

/// Decode env bytes straight into a map.
pub fn unmarshal_bytes(input: &[u8]) -> Result<EnvMap, Error> {
    let text = std::str::from_utf8(input)?;
    unmarshal(text)
}

/// Decode env text into a map with explicit options and lookup.
pub fn unmarshal_with(
    input: &str,
    options: ParseOptions,
    env: &impl EnvLookup,
) -> Result<EnvMap, Error> {
    let entries = parse_str_with(input, options, env)?;
    Ok(entries
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect())
}

pub(crate) fn parse_str_with_source(
    input: &str,
    source: Option<&Path>,
    options: ParseOptions,
    env: &dyn EnvLookup,
) -> Result<Vec<Entry>, ParseError> {
    let normalized = normalize_newlines(input);
    let parser = Parser {
        input: normalized.as_ref(),
        pos: 0,
        line: 1,
        line_start: 0,
        options,
        env,
        source,
        entries: Vec::new(),
        by_key: HashMap::new(),
    };
    let entries = parser.run()?;
    tracing::trace!(entries = entries.len(), source = ?source, "decoded env input");
    Ok(entries)
}

fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            out.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            continue;
        }
        out.push(ch);
    }

    Cow::Owned(out)
}

/// Cursor over the whole input. Quoted values may run past the physical line
/// they start on, so `line`/`line_start` are bumped wherever a `\n` is consumed.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    line: u32,
    line_start: usize,
    options: ParseOptions,
    env: &'a dyn EnvLookup,
    source: Option<&'a Path>,
    entries: Vec<Entry>,
    by_key: HashMap<String, usize>,
}

impl Parser<'_> {
    fn run(mut self) -> Result<Vec<Entry>, ParseError> {
        while self.pos < self.input.len() {
            self.statement()?;
        }
        Ok(self.entries)
    }

    fn statement(&mut self) -> Result<(), ParseError> {
        let input = self.input;
        let line_end = self.line_end(self.pos);
        let line = &input[self.pos..line_end];

        let mut working = line.trim_start();
        if working.is_empty() || working.starts_with('#') {
            self.finish_line(line_end);
            return Ok(());
        }

        // `export = 1` assigns the key `export` itself.
        if let Some(rest) = working.strip_prefix("export")
            && rest.starts_with(char::is_whitespace)
            && !rest.trim_start().starts_with('=')
        {
            working = rest.trim_start();
        }
        let working_start = line_end - working.len();

        let Some(eq_idx) = working.find('=') else {
            return Err(self.error(line_end, ParseErrorKind::MissingSeparator));
        };

        let key = working[..eq_idx].trim_end();
        if key.is_empty() {
            return Err(self.error(working_start, ParseErrorKind::EmptyKey));
        }
        if !is_valid_key(key, self.options.key_parsing_mode) {
            return Err(self.error(working_start, ParseErrorKind::InvalidKey));
        }

        let statement_line = self.line;
        let raw_start = working_start + eq_idx + 1;
        // Same whitespace class as key and unquoted-value trimming.
        let value_start = line_end - input[raw_start..line_end].trim_start().len();

        let (value, value_end) = match input.as_bytes().get(value_start) {
            Some(b'"') => self.double_quoted(value_start)?,
            Some(b'\'') => self.single_quoted(value_start)?,
            _ => (self.unquoted(raw_start, line_end), line_end),
        };

        let tail_end = self.line_end(value_end);
        let tail = input[value_end..tail_end].trim_start();
        if !tail.is_empty() && !tail.starts_with('#') {
            let tail_start = tail_end - tail.len();
            return Err(self.error(tail_start, ParseErrorKind::TrailingCharacters));
        }

        self.store(Entry {
            key: key.to_owned(),
            value,
            source: self.source.map(Path::to_path_buf),
            line: statement_line,
        });
        self.finish_line(tail_end);
        Ok(())
    }

    fn double_quoted(&mut self, open: usize) -> Result<(String, usize), ParseError> {
        let input = self.input;
        let unterminated = self.error(open, ParseErrorKind::UnterminatedQuote);
        let expand = self.options.substitution_mode == SubstitutionMode::Expand;

        let mut out = String::new();
        let mut idx = open + 1;
        while let Some(ch) = input[idx..].chars().next() {
            match ch {
                '"' => return Ok((out, idx + 1)),
                '\\' => {
                    let Some(escaped) = input[idx + 1..].chars().next() else {
                        break;
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        '\n' => {
                            self.new_line(idx + 1);
                            out.push('\n');
                        }
                        other => out.push(other),
                    }
                    idx += 1 + escaped.len_utf8();
                }
                '$' if expand => match parse_placeholder(input, idx) {
                    Some(placeholder) => {
                        out.push_str(&self.resolve(placeholder.name));
                        idx = placeholder.end;
                    }
                    None => {
                        out.push('$');
                        idx += 1;
                    }
                },
                '\n' => {
                    self.new_line(idx);
                    out.push('\n');
                    idx += 1;
                }
                _ => {
                    out.push(ch);
                    idx += ch.len_utf8();
                }
            }
        }

        Err(unterminated)
    }

    fn single_quoted(&mut self, open: usize) -> Result<(String, usize), ParseError> {
        let input = self.input;
        let body_start = open + 1;
        let Some(close) = input[body_start..].find('\'') else {
            return Err(self.error(open, ParseErrorKind::UnterminatedQuote));
        };

        let body = &input[body_start..body_start + close];
        for (offset, _) in body.match_indices('\n') {
            self.new_line(body_start + offset);
        }
        Ok((body.to_owned(), body_start + close + 1))
    }

    fn unquoted(&self, start: usize, line_end: usize) -> String {
        let raw = &self.input[start..line_end];

        let mut cut = raw.len();
        let mut after_space = false;
        for (idx, ch) in raw.char_indices() {
            if ch == '#' && after_space {
                cut = idx;
                break;
            }
            after_space = ch.is_whitespace();
        }

        let value = raw[..cut].trim();
        match self.options.substitution_mode {
            SubstitutionMode::Expand => expand_template(value, |name| self.resolve(name)),
            SubstitutionMode::Disabled => value.to_owned(),
        }
    }

    /// Earlier entries of this pass shadow the injected environment.
    fn resolve(&self, name: &str) -> String {
        if let Some(idx) = self.by_key.get(name) {
            return self.entries[*idx].value.clone();
        }
        self.env.get_var(name).unwrap_or_default()
    }

    fn store(&mut self, entry: Entry) {
        if let Some(existing_idx) = self.by_key.get(&entry.key).copied() {
            self.entries[existing_idx] = entry;
        } else {
            self.by_key.insert(entry.key.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    fn line_end(&self, from: usize) -> usize {
        self.input[from..]
            .find('\n')
            .map_or(self.input.len(), |offset| from + offset)
    }

    fn finish_line(&mut self, line_end: usize) {
        self.pos = line_end;
        if self.pos < self.input.len() {
            self.new_line(self.pos);
            self.pos += 1;
        }
    }

    /// Record the `\n` at `newline_idx`.
    fn new_line(&mut self, newline_idx: usize) {
        self.line += 1;
        self.line_start = newline_idx + 1;
    }

    fn error(&self, idx: usize, kind: ParseErrorKind) -> ParseError {
        let column = self.input[self.line_start..idx].chars().count() as u32 + 1;
        ParseError::new(self.line, column, kind).with_path(self.source)
    }
}

fn is_valid_key(key: &str, key_parsing_mode: KeyParsingMode) -> bool {
    match key_parsing_mode {
        KeyParsingMode::Lenient => true,
        KeyParsingMode::Strict => key.chars().all(is_valid_strict_key_char),
    }
}

fn is_valid_strict_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-'
}
