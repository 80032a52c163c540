use crate::token::{Token, TokenKind};

/// Tokenizes a comment-stripped directive or expression fragment into
/// preprocessing tokens.
///
/// This is deliberately not a full C tokenizer: CBI never needs to
/// typecheck or evaluate anything beyond `#if` expressions and macro
/// bodies, so punctuators are recognised just precisely enough to split
/// multi-character operators (`##`, `<<`, `&&`, …) correctly.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if is_ident_start(c) {
            let start = i;
            i += 1;
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            let spelling: String = chars[start..i].iter().collect();
            out.push(Token::new(TokenKind::Identifier, spelling));
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map(|d| d.is_ascii_digit()).unwrap_or(false)) {
            let start = i;
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                if d.is_ascii_alphanumeric() || d == '.' {
                    // Exponent sign: 1e+10, 0x1p-3
                    i += 1;
                } else if (d == '+' || d == '-')
                    && matches!(chars.get(i.wrapping_sub(1)), Some('e') | Some('E') | Some('p') | Some('P'))
                {
                    i += 1;
                } else {
                    break;
                }
            }
            let spelling: String = chars[start..i].iter().collect();
            out.push(Token::new(TokenKind::Number, spelling));
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if chars[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let spelling: String = chars[start..i].iter().collect();
            let kind = if quote == '"' { TokenKind::StringLiteral } else { TokenKind::CharLiteral };
            out.push(Token::new(kind, spelling));
            continue;
        }
        // Punctuators, longest match first.
        let rest: String = chars[i..(chars.len()).min(i + 3)].iter().collect();
        let punct = PUNCTUATORS_3
            .iter()
            .find(|p| rest.starts_with(*p))
            .or_else(|| PUNCTUATORS_2.iter().find(|p| rest.starts_with(*p)))
            .copied()
            .unwrap_or_else(|| {
                // Single-character punctuator/other-character fallback.
                PUNCTUATORS_1.iter().find(|p| **p == c.to_string().as_str()).copied().unwrap_or("")
            });
        if !punct.is_empty() {
            out.push(Token::new(TokenKind::Punctuator, punct));
            i += punct.chars().count();
        } else {
            out.push(Token::new(TokenKind::Punctuator, c.to_string()));
            i += 1;
        }
    }
    out.push(Token::new(TokenKind::Eof, ""));
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

const PUNCTUATORS_3: &[&str] = &["<<=", ">>=", "...", "->*"];
const PUNCTUATORS_2: &[&str] = &[
    "##", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "->", "::", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=",
];
const PUNCTUATORS_1: &[&str] = &[
    "#", "(", ")", "[", "]", "{", "}", ",", ";", ":", "?", "+", "-", "*", "/", "%", "<", ">", "=",
    "!", "&", "|", "^", "~", ".",
];

/// Reconstructs the original spelling of a run of tokens, the way a
/// stringize (`#param`) operation needs it: tokens separated by a single
/// space, matching the "source spelling" rule in `MACRO TABLE`.
pub fn spell(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter(|t| t.kind != TokenKind::Eof && t.kind != TokenKind::Newline)
        .map(|t| t.spelling.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_function_macro_invocation() {
        let toks = tokenize("MAX(A,B) == 0");
        let spellings: Vec<_> = toks.iter().map(|t| t.spelling.as_str()).collect();
        assert_eq!(spellings, vec!["MAX", "(", "A", ",", "B", ")", "==", "0", ""]);
    }

    #[test]
    fn tokenizes_hash_hash_as_one_punctuator() {
        let toks = tokenize("a##b");
        assert_eq!(toks[1].spelling, "##");
    }

    #[test]
    fn string_literal_handles_escaped_quote() {
        let toks = tokenize("\"a\\\"b\"");
        assert_eq!(toks[0].kind, TokenKind::StringLiteral);
        assert_eq!(toks[0].spelling, "\"a\\\"b\"");
    }
}
