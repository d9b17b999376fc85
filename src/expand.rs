//! `$NAME` and `${NAME}` placeholder scanning.

/// A placeholder found at a `$` position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placeholder<'a> {
    pub name: &'a str,
    /// Byte offset just past the placeholder (after `}` for braced names).
    pub end: usize,
}

/// Replace every placeholder in `input` with the result of `resolve`.
///
/// A `$` that does not start a valid placeholder is kept as-is.
pub(crate) fn expand_template<F>(input: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> String,
{
    if !input.contains('$') {
        return input.to_owned();
    }

    let mut out = String::with_capacity(input.len());
    let mut cursor = 0usize;
    let mut idx = 0usize;
    let bytes = input.as_bytes();

    while idx < bytes.len() {
        if bytes[idx] != b'$' {
            idx += 1;
            continue;
        }

        let Some(placeholder) = parse_placeholder(input, idx) else {
            idx += 1;
            continue;
        };

        out.push_str(&input[cursor..idx]);
        out.push_str(&resolve(placeholder.name));

        cursor = placeholder.end;
        idx = placeholder.end;
    }

    out.push_str(&input[cursor..]);
    out
}

/// Parse the placeholder starting at `input[start] == '$'`.
pub(crate) fn parse_placeholder(input: &str, start: usize) -> Option<Placeholder<'_>> {
    let bytes = input.as_bytes();
    if start + 1 >= bytes.len() {
        return None;
    }

    if bytes[start + 1] == b'{' {
        let name_start = start + 2;
        let mut end = name_start;
        while end < bytes.len() && bytes[end] != b'}' {
            end += 1;
        }

        if end >= bytes.len() {
            return None;
        }

        let name = &input[name_start..end];
        if name.is_empty() || !name.bytes().all(is_braced_var_char) {
            return None;
        }

        return Some(Placeholder { name, end: end + 1 });
    }

    let name_start = start + 1;
    if !is_unbraced_var_start(bytes[name_start]) {
        return None;
    }

    let mut name_end = name_start + 1;
    while name_end < bytes.len() && is_unbraced_var_char(bytes[name_end]) {
        name_end += 1;
    }

    Some(Placeholder {
        name: &input[name_start..name_end],
        end: name_end,
    })
}

fn is_braced_var_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.' || byte == b'-'
}

fn is_unbraced_var_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_unbraced_var_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(name: &str) -> String {
        name.to_ascii_uppercase()
    }

    #[test]
    fn expands_braced_and_bare_names() {
        assert_eq!(expand_template("${a}/$b_c-d", upper), "A/B_C-d");
    }

    #[test]
    fn keeps_dollars_that_do_not_start_placeholders() {
        assert_eq!(expand_template("cost: $5, ${}, ${open, $", upper), "cost: $5, ${}, ${open, $");
    }

    #[test]
    fn braced_names_allow_dots_and_dashes() {
        let parsed = parse_placeholder("${app.name-x}rest", 0).expect("placeholder");
        assert_eq!(parsed.name, "app.name-x");
        assert_eq!(parsed.end, 13);
    }

    #[test]
    fn bare_name_stops_at_first_non_identifier_byte() {
        let parsed = parse_placeholder("$HOME/bin", 0).expect("placeholder");
        assert_eq!(parsed.name, "HOME");
        assert_eq!(parsed.end, 5);
    }
}
