//! Parser for `key=value` properties text, as loaded by
//! `--load-env-from-properties-file=<ref>`.
//!
//! Follows the usual properties-file rules: `#` and `!` start comment lines,
//! keys end at the first unescaped `=`, `:` or whitespace, a trailing backslash
//! continues the logical line, and `\t \n \r \f \uXXXX` escapes are decoded.
//! Lines end at `\n`, `\r\n` or a lone `\r`. A `\uXXXX` high surrogate followed
//! by a `\uXXXX` low surrogate decodes to one character.

/// Parse properties text into entries, in file order. Later duplicates win when
/// the result is collected into a map.
pub fn parse(text: &str) -> Vec<(String, String)> {
    logical_lines(text)
        .into_iter()
        .filter_map(|line| parse_entry(&line))
        .collect()
}

fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;
    for raw in physical_lines(text) {
        let part = match current {
            // continuation lines have their leading whitespace dropped
            Some(_) => raw.trim_start(),
            None => {
                let trimmed = raw.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                trimmed
            }
        };
        let (body, continued) = split_continuation(part);
        let line = current.get_or_insert_with(String::new);
        line.push_str(body);
        if !continued {
            lines.extend(current.take());
        }
    }
    lines.extend(current);
    lines
}

fn physical_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find(['\r', '\n']) {
            Some(i) => {
                lines.push(&rest[..i]);
                let terminator = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[i + terminator..];
            }
            None => {
                lines.push(rest);
                break;
            }
        }
    }
    lines
}

/// An odd number of trailing backslashes means the line continues.
fn split_continuation(line: &str) -> (&str, bool) {
    let backslashes = line.bytes().rev().take_while(|&b| b == b'\\').count();
    if backslashes % 2 == 1 {
        (&line[..line.len() - 1], true)
    } else {
        (line, false)
    }
}

fn parse_entry(line: &str) -> Option<(String, String)> {
    let mut chars = line.chars().peekable();
    let mut key_raw = String::new();
    let mut escaped = false;
    while let Some(&c) = chars.peek() {
        if escaped {
            key_raw.push('\\');
            key_raw.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            break;
        } else {
            key_raw.push(c);
        }
        chars.next();
    }

    // skip whitespace, then at most one separator, then whitespace again
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
    chars.next_if(|&c| c == '=' || c == ':');
    while chars.next_if(|c| c.is_whitespace()).is_some() {}

    let key = unescape(&key_raw);
    if key.is_empty() {
        return None;
    }
    let value = unescape(&chars.collect::<String>());
    Some((key, value))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
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
                let Some(unit) = code_unit(&hex) else {
                    out.push_str("\\u");
                    out.push_str(&hex);
                    continue;
                };
                let mut units = vec![unit];
                if (0xD800..0xDC00).contains(&unit) {
                    let ahead = chars.as_str();
                    let low = ahead
                        .strip_prefix("\\u")
                        .and_then(|s| s.get(..4))
                        .and_then(code_unit)
                        .filter(|low| (0xDC00..0xE000).contains(low));
                    if let Some(low) = low {
                        units.push(low);
                        chars = ahead[6..].chars();
                    }
                }
                // an unpaired surrogate has no char of its own
                out.extend(
                    char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
                );
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Four hex digits as one UTF-16 code unit.
fn code_unit(hex: &str) -> Option<u16> {
    if hex.len() != 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(hex, 16).ok()
}
