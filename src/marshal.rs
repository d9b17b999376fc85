use std::io::Write;
use std::path::Path;

use crate::error::Error;

/// Serialize key/value pairs into canonical env text.
///
/// Values that survive an `i64` parse/format round trip are written bare,
/// everything else is double-quoted and escaped. Lines are sorted and joined
/// with `\n`, without a trailing newline.
///
/// Fails with [`Error::UnencodableKey`] for a key that would not decode back
/// to itself: an empty key, one containing `=` or a line break, one starting
/// with `#` or `export` plus whitespace, or one with surrounding whitespace.
pub fn marshal<I, K, V>(entries: I) -> Result<String, Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut lines = entries
        .into_iter()
        .map(|(key, value)| encode_line(key.as_ref(), value.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    lines.sort_unstable();
    Ok(lines.join("\n"))
}

/// Serialize `entries` and write them to `path`, newline-terminated.
///
/// Nothing is created when a key cannot be encoded.
pub fn write_file<I, K, V>(entries: I, path: impl AsRef<Path>) -> Result<(), Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let path = path.as_ref();
    let content = marshal(entries)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;

    tracing::debug!(path = %path.display(), bytes = content.len() + 1, "wrote env file");
    Ok(())
}

fn encode_line(key: &str, value: &str) -> Result<String, Error> {
    if !is_encodable_key(key) {
        return Err(Error::UnencodableKey(key.to_owned()));
    }
    if is_canonical_integer(value) {
        return Ok(format!("{key}={value}"));
    }
    Ok(format!("{key}=\"{}\"", escape_double_quoted(value)))
}

fn is_encodable_key(key: &str) -> bool {
    if key.is_empty() || key.starts_with('#') || key.contains(['=', '\n', '\r']) {
        return false;
    }
    if key.starts_with(char::is_whitespace) || key.ends_with(char::is_whitespace) {
        return false;
    }
    !key
        .strip_prefix("export")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

fn is_canonical_integer(value: &str) -> bool {
    value
        .parse::<i64>()
        .is_ok_and(|number| number.to_string() == value)
}

fn escape_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' | '"' | '!' | '$' | '`' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
