use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use cbi_span::{DiagnosticSink, Diagnostic, PhysicalLine};

use crate::pp_lex::spell;
use crate::token::{HideSet, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroKind {
    Object,
    Function { params: Vec<String>, variadic: bool },
}

/// `{name, kind, params?, variadic?, replacement}` from `DATA MODEL`.
#[derive(Debug, Clone)]
pub struct MacroDefinition {
    pub name: String,
    pub kind: MacroKind,
    pub replacement: Vec<Token>,
}

impl MacroDefinition {
    /// Object macros redefined with a token-for-token identical
    /// replacement list are not a warning (`DATA MODEL`); everything else
    /// about the definition must also match to count as identical.
    fn is_identical_redefinition(&self, other: &MacroDefinition) -> bool {
        self.kind == other.kind
            && self.replacement.len() == other.replacement.len()
            && self
                .replacement
                .iter()
                .zip(other.replacement.iter())
                .all(|(a, b)| a.kind == b.kind && a.spelling == b.spelling)
    }
}

/// The flat, single-namespace macro table.
///
/// Cloning is deliberately cheap: definitions are held behind `Rc` so a
/// platform walk can start from a shared baseline (the predefines) and
/// only pay allocation cost for the entries it actually changes.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    defs: HashMap<String, Rc<MacroDefinition>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: MacroDefinition, at: PhysicalLine, diags: &mut DiagnosticSink) {
        if let Some(existing) = self.defs.get(&def.name) {
            if !existing.is_identical_redefinition(&def) {
                diags.push(Diagnostic::MacroWarning {
                    at,
                    message: format!("redefinition of macro '{}' with a different body", def.name),
                });
            } else {
                return;
            }
        }
        self.defs.insert(def.name.clone(), Rc::new(def));
    }

    pub fn undef(&mut self, name: &str) {
        self.defs.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<&MacroDefinition> {
        self.defs.get(name).map(|rc| rc.as_ref())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }
}

/// Macro-expands `input` under `table`, implementing the hide-set rescan
/// algorithm from `MACRO TABLE`. Malformed expansions (unterminated
/// invocations, failed `##`) degrade to a warning and leave the
/// offending tokens unexpanded, per `ERROR HANDLING DESIGN`.
pub fn expand(
    input: &[Token],
    table: &MacroTable,
    at: PhysicalLine,
    diags: &mut DiagnosticSink,
) -> Vec<Token> {
    let mut queue: VecDeque<Token> = input.iter().cloned().collect();
    let mut out = Vec::new();
    while let Some(tok) = queue.pop_front() {
        if tok.kind != TokenKind::Identifier || tok.hide_set.contains(&tok.spelling) {
            out.push(tok);
            continue;
        }
        let Some(def) = table.lookup(&tok.spelling) else {
            out.push(tok);
            continue;
        };
        match &def.kind {
            MacroKind::Object => {
                let hs = tok.hide_set.insert(&tok.spelling);
                let subst = subst_hide_set(&def.replacement, &hs);
                for t in subst.into_iter().rev() {
                    queue.push_front(t);
                }
            }
            MacroKind::Function { params, variadic } => {
                if !next_is_lparen(&queue) {
                    // Not an invocation: the macro name is used bare.
                    out.push(tok);
                    continue;
                }
                let lparen = queue.pop_front().unwrap();
                let _ = lparen;
                let Some((args, rparen)) = collect_arguments(&mut queue, at, diags) else {
                    // Unterminated invocation: emit what we have literally.
                    diags.push(Diagnostic::MacroWarning {
                        at,
                        message: format!("unterminated invocation of function-like macro '{}'", tok.spelling),
                    });
                    out.push(tok);
                    continue;
                };
                let hs = tok.hide_set.intersect(&rparen.hide_set).insert(&tok.spelling);
                let args = bind_variadic(args, params, *variadic);
                let expanded_args: Vec<Vec<Token>> = args
                    .iter()
                    .map(|a| expand(a, table, at, diags))
                    .collect();
                let substituted = substitute(&def.replacement, params, &args, &expanded_args, at, diags);
                let concatenated = apply_concatenation(substituted, at, diags);
                let subst = subst_hide_set(&concatenated, &hs);
                for t in subst.into_iter().rev() {
                    queue.push_front(t);
                }
            }
        }
    }
    out
}

fn next_is_lparen(queue: &VecDeque<Token>) -> bool {
    queue.front().map(|t| t.is_punct("(")).unwrap_or(false)
}

/// Collects the comma-separated, paren-balanced arguments of a
/// function-like macro invocation. Returns `None` if the closing paren
/// is never found.
fn collect_arguments(
    queue: &mut VecDeque<Token>,
    _at: PhysicalLine,
    _diags: &mut DiagnosticSink,
) -> Option<(Vec<Vec<Token>>, Token)> {
    let mut args: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0i32;
    loop {
        let tok = queue.pop_front()?;
        if tok.kind == TokenKind::Eof {
            return None;
        }
        if tok.is_punct("(") {
            depth += 1;
            args.last_mut().unwrap().push(tok);
        } else if tok.is_punct(")") {
            if depth == 0 {
                return Some((args, tok));
            }
            depth -= 1;
            args.last_mut().unwrap().push(tok);
        } else if tok.is_punct(",") && depth == 0 {
            args.push(Vec::new());
        } else {
            args.last_mut().unwrap().push(tok);
        }
    }
}

/// Merges trailing arguments into a single `__VA_ARGS__` slot for
/// variadic function-like macros.
fn bind_variadic(mut args: Vec<Vec<Token>>, params: &[String], variadic: bool) -> Vec<Vec<Token>> {
    if !variadic || args.len() <= params.len() {
        return args;
    }
    let tail: Vec<Token> = args
        .split_off(params.len())
        .into_iter()
        .enumerate()
        .flat_map(|(i, mut toks)| {
            if i > 0 {
                let mut v = vec![Token::new(TokenKind::Punctuator, ",")];
                v.append(&mut toks);
                v
            } else {
                toks
            }
        })
        .collect();
    args.push(tail);
    args
}

/// Parameter substitution: stringize (`#param`) uses the argument's raw
/// spelling, everything else uses the (already macro-expanded) argument
/// tokens except where adjacent to `##`, where the raw argument is used
/// so concatenation sees un-expanded text.
fn substitute(
    replacement: &[Token],
    params: &[String],
    raw_args: &[Vec<Token>],
    expanded_args: &[Vec<Token>],
    at: PhysicalLine,
    diags: &mut DiagnosticSink,
) -> Vec<Token> {
    let param_index = |name: &str| -> Option<usize> {
        if name == "__VA_ARGS__" && params.last().map(|p| p == "__VA_ARGS__").unwrap_or(false) {
            return params.iter().position(|p| p == "__VA_ARGS__");
        }
        params.iter().position(|p| p == name)
    };
    let mut out = Vec::new();
    let mut i = 0;
    while i < replacement.len() {
        let tok = &replacement[i];
        if tok.is_punct("#") {
            if let Some(next) = replacement.get(i + 1) {
                if let Some(idx) = param_index(&next.spelling) {
                    let raw = raw_args.get(idx).cloned().unwrap_or_default();
                    let text = spell(&raw).replace('"', "\\\"");
                    out.push(Token::new(TokenKind::StringLiteral, format!("\"{text}\"")));
                    i += 2;
                    continue;
                }
            }
            diags.push(Diagnostic::MacroWarning {
                at,
                message: "'#' is not followed by a macro parameter".into(),
            });
            out.push(tok.clone());
            i += 1;
            continue;
        }
        if let Some(idx) = param_index(&tok.spelling) {
            let adjacent_to_concat =
                replacement.get(i + 1).map(|t| t.is_punct("##")).unwrap_or(false)
                    || (i > 0 && replacement[i - 1].is_punct("##"));
            if adjacent_to_concat {
                let raw = raw_args.get(idx).cloned().unwrap_or_default();
                if raw.is_empty() {
                    out.push(Token::new(TokenKind::Placemarker, ""));
                } else {
                    out.extend(raw);
                }
            } else {
                let expanded = expanded_args.get(idx).cloned().unwrap_or_default();
                if expanded.is_empty() {
                    out.push(Token::new(TokenKind::Placemarker, ""));
                } else {
                    out.extend(expanded);
                }
            }
            i += 1;
            continue;
        }
        out.push(tok.clone());
        i += 1;
    }
    out
}

/// Applies `##` concatenation left to right over a substituted
/// replacement list. Placemarkers vanish when concatenated with a real
/// token; concatenating two placemarkers yields one placemarker.
fn apply_concatenation(tokens: Vec<Token>, at: PhysicalLine, diags: &mut DiagnosticSink) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is_punct("##") {
            // Malformed leading/trailing `##` (should not occur from a
            // well-formed #define body, but degrade gracefully).
            i += 1;
            continue;
        }
        let mut cur = tokens[i].clone();
        i += 1;
        while i + 1 <= tokens.len() && tokens.get(i).map(|t| t.is_punct("##")).unwrap_or(false) {
            let rhs = tokens.get(i + 1).cloned().unwrap_or(Token::new(TokenKind::Placemarker, ""));
            i += 2;
            cur = concat_pair(cur, rhs, at, diags);
        }
        if cur.kind != TokenKind::Placemarker {
            out.push(cur);
        }
    }
    out
}

fn concat_pair(lhs: Token, rhs: Token, at: PhysicalLine, diags: &mut DiagnosticSink) -> Token {
    if lhs.kind == TokenKind::Placemarker {
        return rhs;
    }
    if rhs.kind == TokenKind::Placemarker {
        return lhs;
    }
    let combined = format!("{}{}", lhs.spelling, rhs.spelling);
    let retokenized: Vec<Token> =
        crate::pp_lex::tokenize(&combined).into_iter().filter(|t| t.kind != TokenKind::Eof).collect();
    if retokenized.len() == 1 {
        Token::new(retokenized[0].kind.clone(), combined)
    } else {
        diags.push(Diagnostic::MacroWarning {
            at,
            message: format!(
                "pasting \"{}\" and \"{}\" does not give a valid preprocessing token",
                lhs.spelling, rhs.spelling
            ),
        });
        // Emit both separately, as the spec allows, joined by a space so
        // the two original tokens remain individually recognisable.
        Token::new(TokenKind::Identifier, format!("{} {}", lhs.spelling, rhs.spelling))
    }
}

fn subst_hide_set(tokens: &[Token], hs: &HideSet) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| Token::with_hide_set(t.kind.clone(), t.spelling.clone(), hs.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pp_lex::tokenize;
    use cbi_span::FileRegistry;
    use std::path::Path;

    fn loc() -> PhysicalLine {
        let reg = FileRegistry::new();
        PhysicalLine::new(reg.intern(Path::new("f.c")), 1)
    }

    fn define_object(table: &mut MacroTable, name: &str, value: &str, diags: &mut DiagnosticSink) {
        let replacement = tokenize(value).into_iter().filter(|t| t.kind != TokenKind::Eof).collect();
        table.define(
            MacroDefinition { name: name.into(), kind: MacroKind::Object, replacement },
            loc(),
            diags,
        );
    }

    #[test]
    fn max_macro_expands_function_like() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        define_object(&mut table, "A", "1", &mut diags);
        define_object(&mut table, "B", "2", &mut diags);
        table.define(
            MacroDefinition {
                name: "MAX".into(),
                kind: MacroKind::Function { params: vec!["a".into(), "b".into()], variadic: false },
                replacement: tokenize("(a)>=(b)?(a):(b)")
                    .into_iter()
                    .filter(|t| t.kind != TokenKind::Eof)
                    .collect(),
            },
            loc(),
            &mut diags,
        );
        let input = tokenize("MAX(A,B) == 0");
        let result = expand(&input, &table, loc(), &mut diags);
        let spelling: Vec<_> = result.iter().map(|t| t.spelling.as_str()).collect();
        assert_eq!(spelling.join(""), "(1)>=(2)?(1):(2)==0");
    }

    #[test]
    fn self_referential_macro_pair_terminates() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        define_object(&mut table, "BAR", "1", &mut diags);
        define_object(&mut table, "FOO", "BAR", &mut diags);
        table.undef("BAR");
        define_object(&mut table, "BAR", "FOO", &mut diags);
        let input = tokenize("FOO == 1");
        let result = expand(&input, &table, loc(), &mut diags);
        // Hide sets block full re-expansion; the hygienic result leaves
        // the cyclic name unexpanded rather than looping forever.
        assert!(result.iter().any(|t| t.spelling == "FOO"));
    }

    #[test]
    fn stringize_uses_raw_argument_spelling() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        table.define(
            MacroDefinition {
                name: "STR".into(),
                kind: MacroKind::Function { params: vec!["x".into()], variadic: false },
                replacement: tokenize("#x").into_iter().filter(|t| t.kind != TokenKind::Eof).collect(),
            },
            loc(),
            &mut diags,
        );
        let input = tokenize("STR(hello)");
        let result = expand(&input, &table, loc(), &mut diags);
        assert_eq!(result[0].spelling, "\"hello\"");
    }

    #[test]
    fn concatenation_builds_new_identifier() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        table.define(
            MacroDefinition {
                name: "CAT".into(),
                kind: MacroKind::Function { params: vec!["a".into(), "b".into()], variadic: false },
                replacement: tokenize("a##b").into_iter().filter(|t| t.kind != TokenKind::Eof).collect(),
            },
            loc(),
            &mut diags,
        );
        let input = tokenize("CAT(foo,bar)");
        let result = expand(&input, &table, loc(), &mut diags);
        assert_eq!(result[0].spelling, "foobar");
    }
}
