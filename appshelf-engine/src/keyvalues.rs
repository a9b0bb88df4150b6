//! Minimal reader and writer for Valve's KeyValues text format.
//!
//! Only the `"key" "value"` pairs directly inside the root block are read;
//! nested blocks are skipped. Keys are lower-cased on read since Steam is
//! inconsistent about their casing (`SizeOnDisk` vs `sizeondisk`).

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Open,
    Close,
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => tokens.push(Token::Open),
            '}' => tokens.push(Token::Close),
            '"' => {
                let mut value = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(other),
                            None => break,
                        },
                        other => value.push(other),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '{' || next == '}' || next == '"' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Str(word));
            }
        }
    }
    tokens
}

/// Read the flat pairs of the root block, e.g. the `AppState` block of an ACF file.
#[must_use]
pub fn parse_flat(input: &str) -> BTreeMap<String, String> {
    let tokens = tokenize(input);
    let mut pairs = BTreeMap::new();
    let mut iter = tokens.into_iter().peekable();

    // Root name, then its opening brace.
    if matches!(iter.peek(), Some(Token::Str(_))) {
        iter.next();
    }
    if iter.next() != Some(Token::Open) {
        return pairs;
    }

    while let Some(token) = iter.next() {
        match token {
            Token::Close => break,
            Token::Open => skip_block(&mut iter),
            Token::Str(key) => match iter.next() {
                Some(Token::Str(value)) => {
                    pairs.insert(key.to_ascii_lowercase(), value);
                }
                Some(Token::Open) => skip_block(&mut iter),
                Some(Token::Close) | None => break,
            },
        }
    }
    pairs
}

fn skip_block(iter: &mut impl Iterator<Item = Token>) {
    let mut depth = 1usize;
    for token in iter {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            Token::Str(_) => {}
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a root block holding flat pairs, in the given order.
#[must_use]
pub fn write_flat(root: &str, pairs: &[(&str, String)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("\"{}\"\n{{\n", escape(root)));
    for (key, value) in pairs {
        out.push_str(&format!("\t\"{}\"\t\t\"{}\"\n", escape(key), escape(value)));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACF: &str = r#"
"AppState"
{
	"appid"		"570"
	"Universe"		"1"
	"name"		"Dota 2"
	"installdir"		"dota 2 beta"
	"SizeOnDisk"		"41234567890"
	"LastUpdated"		"1700000000"
	// a comment
	"InstalledDepots"
	{
		"573"
		{
			"manifest"		"123"
		}
	}
	"StateFlags"		"4"
}
"#;

    #[test]
    fn test_parse_flat_pairs() {
        let pairs = parse_flat(ACF);
        assert_eq!(pairs.get("appid").map(String::as_str), Some("570"));
        assert_eq!(pairs.get("name").map(String::as_str), Some("Dota 2"));
        assert_eq!(pairs.get("sizeondisk").map(String::as_str), Some("41234567890"));
        assert_eq!(pairs.get("stateflags").map(String::as_str), Some("4"));
        assert!(!pairs.contains_key("manifest"));
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_flat("").is_empty());
        assert!(parse_flat("not a block").is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let text = write_flat(
            "AppState",
            &[
                ("appid", "10".to_string()),
                ("name", "Quote \"Game\"".to_string()),
            ],
        );
        assert!(text.starts_with("\"AppState\"\n{\n"));
        assert!(text.contains("\t\"appid\"\t\t\"10\"\n"));
        assert!(text.ends_with("}\n"));
        let pairs = parse_flat(&text);
        assert_eq!(pairs.get("name").map(String::as_str), Some("Quote \"Game\""));
    }
}
