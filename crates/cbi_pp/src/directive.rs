use crate::macros::{MacroDefinition, MacroKind};
use crate::pp_lex::tokenize;
use crate::token::TokenKind;

/// Parses the text following `#define` (e.g. `FOO(a,b) (a)+(b)`) into a
/// [`MacroDefinition`]. Function-like macros require the `(` to be
/// immediately adjacent to the name with no intervening space — the one
/// place CBI must look at raw text rather than tokens, since tokenizing
/// first would throw away that adjacency.
pub fn parse_define(text: &str) -> Option<MacroDefinition> {
    let text = text.trim_start();
    let name_len = text
        .char_indices()
        .take_while(|(i, c)| if *i == 0 { c.is_alphabetic() || *c == '_' } else { c.is_alphanumeric() || *c == '_' })
        .count();
    if name_len == 0 {
        return None;
    }
    let name = text[..name_len].to_string();
    let rest = &text[name_len..];

    if let Some(params_and_body) = rest.strip_prefix('(') {
        let close = params_and_body.find(')')?;
        let params_text = &params_and_body[..close];
        let body = params_and_body[close + 1..].trim_start();
        let mut variadic = false;
        let params: Vec<String> = params_text
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p == "..." {
                    variadic = true;
                    "__VA_ARGS__".to_string()
                } else {
                    p.to_string()
                }
            })
            .collect();
        let replacement = tokenize(body).into_iter().filter(|t| t.kind != TokenKind::Eof).collect();
        Some(MacroDefinition { name, kind: MacroKind::Function { params, variadic }, replacement })
    } else {
        let body = rest.trim_start();
        let replacement = tokenize(body).into_iter().filter(|t| t.kind != TokenKind::Eof).collect();
        Some(MacroDefinition { name, kind: MacroKind::Object, replacement })
    }
}

/// Parses one `-D`-style predefine string (e.g. `FOO=3`, or bare `FOO`)
/// into a [`MacroDefinition`]. The Compiler Emulator passes through the
/// attached value verbatim (`FOO=3` for `-DFOO=3`), so this splits on the
/// first `=` rather than handing the whole string to [`parse_define`],
/// which would instead treat `=3` as the start of the replacement list
/// and leave a stray `=` token in front of the value. A predefine with no
/// `=` (or an empty value after it) defines to `1`, matching `-DFOO`.
pub fn parse_predefine(entry: &str) -> Option<MacroDefinition> {
    let (name, value) = match entry.split_once('=') {
        Some((name, value)) if !value.is_empty() => (name, value),
        Some((name, _)) => (name, "1"),
        None => (entry, "1"),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let replacement = tokenize(value).into_iter().filter(|t| t.kind != TokenKind::Eof).collect();
    Some(MacroDefinition { name: name.to_string(), kind: MacroKind::Object, replacement })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_like_macro() {
        let def = parse_define("FOO 1 + 2").unwrap();
        assert_eq!(def.kind, MacroKind::Object);
        assert_eq!(def.replacement.len(), 3);
    }

    #[test]
    fn function_like_macro_requires_adjacent_paren() {
        let def = parse_define("MAX(a,b) (a)>=(b)?(a):(b)").unwrap();
        match def.kind {
            MacroKind::Function { params, variadic } => {
                assert_eq!(params, vec!["a", "b"]);
                assert!(!variadic);
            }
            _ => panic!("expected function-like macro"),
        }
    }

    #[test]
    fn space_before_paren_makes_it_object_like() {
        let def = parse_define("NOTFN (a)").unwrap();
        assert_eq!(def.kind, MacroKind::Object);
    }

    #[test]
    fn variadic_macro() {
        let def = parse_define("LOG(fmt, ...) printf(fmt, __VA_ARGS__)").unwrap();
        match def.kind {
            MacroKind::Function { params, variadic } => {
                assert!(variadic);
                assert_eq!(params.last().unwrap(), "__VA_ARGS__");
            }
            _ => panic!(),
        }
    }

    #[test]
    fn bare_define_has_empty_replacement() {
        let def = parse_define("FLAG").unwrap();
        assert!(def.replacement.is_empty());
    }

    #[test]
    fn predefine_with_value_splits_on_first_equals() {
        let def = parse_predefine("FOO=3").unwrap();
        assert_eq!(def.name, "FOO");
        assert_eq!(def.kind, MacroKind::Object);
        assert_eq!(def.replacement.len(), 1);
        assert_eq!(def.replacement[0].spelling, "3");
    }

    #[test]
    fn bare_predefine_defines_to_one() {
        let def = parse_predefine("FOO").unwrap();
        assert_eq!(def.name, "FOO");
        assert_eq!(def.replacement.len(), 1);
        assert_eq!(def.replacement[0].spelling, "1");
    }

    #[test]
    fn predefine_with_empty_value_defines_to_one() {
        let def = parse_predefine("FOO=").unwrap();
        assert_eq!(def.replacement.len(), 1);
        assert_eq!(def.replacement[0].spelling, "1");
    }
}
