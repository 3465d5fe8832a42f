use std::collections::HashMap;

/// Positional and `key=value` arguments split out of a raw command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub positional: Vec<String>,
    pub named: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

fn is_space(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

fn is_quote(ch: char) -> bool {
    ch == '"' || ch == '\''
}

/// Reads a quoted segment starting at `start` (which must hold the opening
/// quote). Returns the unescaped text and the index just past the closing
/// quote, or the end of input when the quote is never closed.
fn read_quoted(chars: &[char], start: usize) -> (String, usize) {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' && i + 1 < chars.len() && (is_quote(chars[i + 1]) || chars[i + 1] == '\\') {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if ch == quote {
            if i + 1 < chars.len() && chars[i + 1] == quote {
                out.push(quote);
                i += 2;
                continue;
            }
            return (out, i + 1);
        }
        out.push(ch);
        i += 1;
    }
    (out, i)
}

fn tokenize(raw: &str) -> Vec<Token> {
    let chars: Vec<char> = raw.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && is_space(chars[i]) {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        if is_quote(chars[i]) {
            let (text, next) = read_quoted(&chars, i);
            tokens.push(Token { text, quoted: true });
            i = next;
            continue;
        }
        // Bare token: a quote inside it (as in `key="a b"`) opens a span that
        // is kept verbatim so its whitespace does not split the token.
        let mut text = String::new();
        while i < chars.len() && !is_space(chars[i]) {
            if is_quote(chars[i]) {
                let (_, next) = read_quoted(&chars, i);
                text.extend(&chars[i..next]);
                i = next;
            } else {
                text.push(chars[i]);
                i += 1;
            }
        }
        tokens.push(Token {
            text,
            quoted: false,
        });
    }
    tokens
}

fn unquote_value(rest: &str) -> String {
    let chars: Vec<char> = rest.chars().collect();
    if chars.first().copied().map(is_quote).unwrap_or(false) {
        let (mut value, next) = read_quoted(&chars, 0);
        value.extend(&chars[next..]);
        return value;
    }
    rest.to_string()
}

/// Splits `raw` into positional tokens and `key=value` pairs.
///
/// A token that opens with a quote is always positional, even when its
/// content holds `=`: `"x=y"` is the positional `x=y`, not a named pair.
/// This is how a positional value containing `=` is written, and
/// [`build_raw_command`] depends on it. To quote a named value, quote only
/// the value part: `key="a b"`. A later duplicate key overwrites the
/// earlier value.
pub fn parse_args(raw: &str) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return parsed;
    }
    for token in tokenize(trimmed) {
        if !token.quoted {
            if let Some(eq) = token.text.find('=') {
                let key = token.text[..eq].trim();
                if eq > 0 && !key.is_empty() {
                    let value = unquote_value(&token.text[eq + 1..]);
                    parsed.named.insert(key.to_string(), value);
                    continue;
                }
            }
        }
        parsed.positional.push(token.text);
    }
    parsed
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty() || value.chars().any(|ch| is_space(ch) || is_quote(ch) || ch == '\\' || ch == '=')
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Builds a command line that [`parse_args`] turns back into exactly
/// `api_key`, `args` and `named`.
pub fn build_raw_command(api_key: &str, args: &[String], named: &[(String, String)]) -> String {
    let mut parts = vec![api_key.to_string()];
    for arg in args {
        if needs_quoting(arg) {
            parts.push(quote(arg));
        } else {
            parts.push(arg.clone());
        }
    }
    for (key, value) in named {
        let rendered = if needs_quoting(value) {
            quote(value)
        } else {
            value.clone()
        };
        parts.push(format!("{}={}", key, rendered));
    }
    parts.join(" ")
}

/// Joins already-split command line words (as a shell hands them over) into
/// one raw command without losing word boundaries. Words with whitespace are
/// quoted; for `key=value` words only the value is quoted, so they stay named.
pub fn join_argv(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            if !word.is_empty() && !word.chars().any(is_space) {
                return word.clone();
            }
            match word.split_once('=') {
                Some((key, value))
                    if !key.is_empty()
                        && !key.chars().any(|ch| is_space(ch) || is_quote(ch)) =>
                {
                    format!("{}={}", key, quote(value))
                }
                _ => quote(word),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
