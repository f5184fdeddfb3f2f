//! Text helpers for task field values
//!
//! Variable tokens (`$(id)` / `$(id.path)`), their `<var>` highlighting,
//! quoting rules used by the compiler, and the codec between the
//! newline-per-item editing form of array fields and the bracketed list.

const VAR_OPEN: &str = "<var>";
const VAR_CLOSE: &str = "</var>";

/// Byte ranges of every `$(...)` token in `text`.
///
/// A token is `$(` followed by an identifier and optional `.segment` path
/// parts, closed by `)`.
pub fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'(' {
            let start = i;
            let mut j = i + 2;
            let body_start = j;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'.') {
                j += 1;
            }
            let body = &text[body_start..j];
            let well_formed = j < bytes.len()
                && bytes[j] == b')'
                && body
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && !body.ends_with('.')
                && !body.contains("..");
            if well_formed {
                spans.push((start, j + 1));
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    spans
}

/// Strip `<var>` markup added by [`highlight`]
pub fn unhighlight(text: &str) -> String {
    text.replace(VAR_OPEN, "").replace(VAR_CLOSE, "")
}

/// Wrap every variable token in `<var>...</var>`.
///
/// Already-highlighted text is normalised first, so applying this twice
/// gives the same result as applying it once.
pub fn highlight(text: &str) -> String {
    let plain = unhighlight(text);
    let mut out = String::with_capacity(plain.len());
    let mut last = 0;
    for (start, end) in token_spans(&plain) {
        out.push_str(&plain[last..start]);
        out.push_str(VAR_OPEN);
        out.push_str(&plain[start..end]);
        out.push_str(VAR_CLOSE);
        last = end;
    }
    out.push_str(&plain[last..]);
    out
}

/// Backslash-escape backslashes and double quotes for a quoted attribute
pub fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for a TOML basic string, control characters included
pub fn escape_toml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_quoted`]
pub fn unescape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Remove whitespace outside of string literals (request bodies, JSON data)
pub fn collapse_body(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in value.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if !c.is_whitespace() {
            out.push(c);
        }
    }
    out
}

/// Split on commas that are not nested inside `()`, `[]`, `{}` or quotes.
///
/// Only closed pairs nest. An opening bracket or quote that is never closed
/// is an ordinary character, so it cannot swallow the items after it.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut nested = vec![false; bytes.len()];
    let mut open: Vec<(u8, usize)> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                if let Some(end) = closing_quote(bytes, i + 1) {
                    nested[i..=end].fill(true);
                    i = end;
                }
            }
            b'(' | b'[' | b'{' => open.push((bytes[i], i)),
            closer @ (b')' | b']' | b'}') => {
                let opener = match closer {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                if let Some(pos) = open.iter().rposition(|&(c, _)| c == opener) {
                    let start = open[pos].1;
                    open.truncate(pos);
                    nested[start..=i].fill(true);
                }
            }
            _ => {}
        }
        i += 1;
    }

    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, &b) in bytes.iter().enumerate() {
        if b == b',' && !nested[idx] {
            parts.push(&text[start..idx]);
            start = idx + 1;
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Index of the unescaped `"` closing a string whose body starts at `from`
fn closing_quote(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Encode the newline-per-item editing form into `[a,b,c]`.
///
/// Empty text encodes to the empty string; blank lines become empty items.
pub fn encode_array_lines(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!("[{}]", text.split('\n').collect::<Vec<_>>().join(","))
}

/// Decode `[a,b,c]` back to one item per line.
pub fn decode_array_lines(value: &str) -> String {
    let inner = strip_brackets(value);
    if value.is_empty() {
        return String::new();
    }
    split_top_level(inner).join("\n")
}

/// Items of an array field, trimmed, with empty items dropped
pub fn array_items(value: &str) -> Vec<String> {
    let inner = strip_brackets(value.trim());
    if inner.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(inner)
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render items as the bracketed list used inside `<...>` attributes
pub fn render_array(items: &[String]) -> String {
    if items.is_empty() {
        "[]".to_string()
    } else {
        format!("[ {} ]", items.join(", "))
    }
}

fn strip_brackets(value: &str) -> &str {
    let value = value.strip_prefix('[').unwrap_or(value);
    value.strip_suffix(']').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_spans() {
        let text = "a $(fetch) b $(parse.data.0) $(bad $(1x) $()";
        let tokens: Vec<&str> = token_spans(text).into_iter().map(|(s, e)| &text[s..e]).collect();
        assert_eq!(tokens, vec!["$(fetch)", "$(parse.data.0)"]);
    }

    #[test]
    fn test_highlight_is_idempotent() {
        let once = highlight("x=$(fetch) y=$(jobRun.logData)");
        assert_eq!(once, "x=<var>$(fetch)</var> y=<var>$(jobRun.logData)</var>");
        assert_eq!(highlight(&once), once);
        assert_eq!(unhighlight(&once), "x=$(fetch) y=$(jobRun.logData)");
    }

    #[test]
    fn test_escape_round_trip() {
        let raw = r#"{"a": "q\"uote"}"#;
        assert_eq!(unescape_quoted(&escape_quoted(raw)), raw);
        assert_eq!(escape_quoted("12345.67"), "12345.67");
    }

    #[test]
    fn test_collapse_body_keeps_string_contents() {
        let body = "{\n  \"data\": \"hello world\",\n  \"n\": 1\n}";
        assert_eq!(collapse_body(body), r#"{"data":"hello world","n":1}"#);
    }

    #[test]
    fn test_array_lines_keep_references_apart() {
        let text = "$(fetch1)\n$(fetch2)";
        let encoded = encode_array_lines(text);
        assert_eq!(encoded, "[$(fetch1),$(fetch2)]");
        assert_eq!(decode_array_lines(&encoded), text);
        assert_eq!(array_items(&encoded), vec!["$(fetch1)", "$(fetch2)"]);
    }

    #[test]
    fn test_array_lines_preserve_blank_lines() {
        for text in ["a\n\nb", "\n", "a\n", "\n\n\n", "x"] {
            assert_eq!(decode_array_lines(&encode_array_lines(text)), text, "text {:?}", text);
        }
        assert_eq!(encode_array_lines(""), "");
        assert_eq!(decode_array_lines(""), "");
    }

    #[test]
    fn test_nested_commas_do_not_split() {
        let text = r#"{"a":1,"b":2}
"x,y"
[1,2]"#;
        assert_eq!(decode_array_lines(&encode_array_lines(text)), text);
    }

    #[test]
    fn test_unclosed_openers_do_not_swallow_items() {
        for text in ["(a\nb\nc", "\"a\nb\nc", "a\n{b\nc", "x)\ny\n]z"] {
            assert_eq!(decode_array_lines(&encode_array_lines(text)), text, "text {:?}", text);
        }
        assert_eq!(array_items("[(a,b,c]"), vec!["(a", "b", "c"]);
        assert_eq!(split_top_level(r#"f(1,"x,y"),(2"#), vec![r#"f(1,"x,y")"#, "(2"]);
        assert_eq!(split_top_level(r#""a\",b",c"#), vec![r#""a\",b""#, "c"]);
    }

    #[test]
    fn test_escape_toml_control_characters() {
        assert_eq!(escape_toml("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_toml("a\tb\r"), "a\\tb\\r");
        assert_eq!(escape_toml("bell\u{7}"), "bell\\u0007");
        assert_eq!(escape_toml(r#"say "hi" \"#), r#"say \"hi\" \\"#);
        assert_eq!(escape_toml("Get > Uint256"), "Get > Uint256");
    }

    #[test]
    fn test_render_array() {
        assert_eq!(render_array(&[]), "[]");
        assert_eq!(render_array(&["1".into(), "$(a)".into()]), "[ 1, $(a) ]");
    }
}
