//! Reader and writer for the `key = value` properties format used by feature
//! `<config>` blocks, `.cfg` storage files and profile files.

use indexmap::IndexMap;

use crate::error::{ProvisionError, ProvisionResult};

/// Ordered key/value map; iteration order is file order
pub type Properties = IndexMap<String, String>;

/// Parse properties text.
///
/// Supports `=`, `:` and whitespace separators, `#`/`!` comments, trailing
/// backslash continuations and the usual escapes including `\uXXXX`.
pub fn parse(text: &str) -> Properties {
    let mut props = Properties::new();
    let mut logical = String::new();

    for raw in text.lines() {
        let line = raw.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if ends_with_continuation(line) {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }

        logical.push_str(line);
        let (key, value) = split_entry(&logical);
        props.insert(key, value);
        logical.clear();
    }

    if !logical.is_empty() {
        let (key, value) = split_entry(&logical);
        props.insert(key, value);
    }

    props
}

/// Parse properties from raw file bytes
pub fn from_bytes(bytes: &[u8]) -> ProvisionResult<Properties> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ProvisionError::format(format!("Properties content is not valid UTF-8: {}", e)))?;
    Ok(parse(text))
}

/// Render properties as text, one `key = value` entry per line
pub fn to_string(props: &Properties) -> String {
    let mut out = String::new();
    for (key, value) in props {
        out.push_str(&escape(key, true));
        out.push_str(" = ");
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

/// Render properties as file bytes
pub fn to_bytes(props: &Properties) -> Vec<u8> {
    to_string(props).into_bytes()
}

fn ends_with_continuation(line: &str) -> bool {
    let slashes = line.chars().rev().take_while(|&c| c == '\\').count();
    slashes % 2 == 1
}

fn split_entry(line: &str) -> (String, String) {
    let mut key_end = line.len();
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }

    let key = unescape(&line[..key_end]);
    let mut rest = line[key_end..].trim_start_matches([' ', '\t']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t']);
    }
    (key, unescape(rest))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape(raw: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (idx, c) in raw.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || idx == 0 => out.push_str("\\ "),
            '#' | '!' if idx == 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
