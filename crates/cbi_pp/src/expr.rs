use cbi_span::{Diagnostic, DiagnosticSink, PhysicalLine};

use crate::macros::{expand, MacroTable};
use crate::token::{Token, TokenKind};

/// Evaluates a `#if`/`#elif` controlling expression.
///
/// `defined(X)` / `defined X` are resolved first, against the *unexpanded*
/// operand, then the whole expression is macro-expanded, then evaluated.
/// Any identifier surviving expansion is treated as the literal `0`.
/// Division/modulo by zero downgrades to a warning and `false`, never a
/// propagated failure (`ERROR HANDLING DESIGN`).
pub fn evaluate(tokens: &[Token], table: &MacroTable, at: PhysicalLine, diags: &mut DiagnosticSink) -> bool {
    let resolved = resolve_defined(tokens, table);
    let expanded = expand(&resolved, table, at, diags);
    let significant: Vec<Token> = expanded
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Newline | TokenKind::Placemarker))
        .collect();
    let mut cursor = Cursor { tokens: significant, pos: 0 };
    match parse_comma(&mut cursor, true) {
        Ok(v) => v != 0,
        Err(EvalError(msg)) => {
            diags.push(Diagnostic::ExpressionError { at, message: msg });
            false
        }
    }
}

/// Replaces every `defined(X)` / `defined X` with a literal `1` or `0`
/// token, without macro-expanding `X`. Must run before the general macro
/// expansion pass so `defined` sees the programmer's literal identifier.
fn resolve_defined(tokens: &[Token], table: &MacroTable) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is_identifier("defined") {
            if tokens.get(i + 1).map(|t| t.is_punct("(")).unwrap_or(false) {
                if let Some(name_tok) = tokens.get(i + 2) {
                    let closed = tokens.get(i + 3).map(|t| t.is_punct(")")).unwrap_or(false);
                    if closed && name_tok.kind == TokenKind::Identifier {
                        out.push(literal(table.is_defined(&name_tok.spelling)));
                        i += 4;
                        continue;
                    }
                }
            } else if let Some(name_tok) = tokens.get(i + 1) {
                if name_tok.kind == TokenKind::Identifier {
                    out.push(literal(table.is_defined(&name_tok.spelling)));
                    i += 2;
                    continue;
                }
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

fn literal(b: bool) -> Token {
    Token::new(TokenKind::Number, if b { "1" } else { "0" })
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.peek().map(|t| t.is_punct(p)).unwrap_or(false) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

struct EvalError(String);

/// `eval` is `false` on the short-circuited side of `&&`/`||`: tokens are
/// still consumed to keep the cursor in sync, but internal faults (like
/// division by zero) are swallowed rather than surfaced, matching the
/// C rule that the skipped side need not even be well-formed.
type PResult = Result<i64, EvalError>;

fn parse_comma(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_conditional(c, eval)?;
    while c.eat_punct(",") {
        v = parse_conditional(c, eval)?;
    }
    Ok(v)
}

fn parse_conditional(c: &mut Cursor, eval: bool) -> PResult {
    let cond = parse_logical_or(c, eval)?;
    if c.eat_punct("?") {
        let then_eval = eval && cond != 0;
        let then_val = parse_conditional(c, then_eval)?;
        if !c.eat_punct(":") {
            return Err(EvalError("expected ':' in conditional expression".into()));
        }
        let else_eval = eval && cond == 0;
        let else_val = parse_conditional(c, else_eval)?;
        return Ok(if cond != 0 { then_val } else { else_val });
    }
    Ok(cond)
}

fn parse_logical_or(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_logical_and(c, eval)?;
    while c.eat_punct("||") {
        let short_circuit = v != 0;
        let rhs = parse_logical_and(c, eval && !short_circuit)?;
        v = if short_circuit { 1 } else { (rhs != 0) as i64 };
    }
    Ok(v)
}

fn parse_logical_and(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_bitor(c, eval)?;
    while c.eat_punct("&&") {
        let short_circuit = v == 0;
        let rhs = parse_bitor(c, eval && !short_circuit)?;
        v = if short_circuit { 0 } else { (rhs != 0) as i64 };
    }
    Ok(v)
}

fn parse_bitor(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_bitxor(c, eval)?;
    while c.eat_punct("|") {
        v |= parse_bitxor(c, eval)?;
    }
    Ok(v)
}

fn parse_bitxor(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_bitand(c, eval)?;
    while c.eat_punct("^") {
        v ^= parse_bitand(c, eval)?;
    }
    Ok(v)
}

fn parse_bitand(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_equality(c, eval)?;
    while c.eat_punct("&") {
        v &= parse_equality(c, eval)?;
    }
    Ok(v)
}

fn parse_equality(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_relational(c, eval)?;
    loop {
        if c.eat_punct("==") {
            v = (v == parse_relational(c, eval)?) as i64;
        } else if c.eat_punct("!=") {
            v = (v != parse_relational(c, eval)?) as i64;
        } else {
            break;
        }
    }
    Ok(v)
}

fn parse_relational(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_shift(c, eval)?;
    loop {
        if c.eat_punct("<=") {
            v = (v <= parse_shift(c, eval)?) as i64;
        } else if c.eat_punct(">=") {
            v = (v >= parse_shift(c, eval)?) as i64;
        } else if c.eat_punct("<") {
            v = (v < parse_shift(c, eval)?) as i64;
        } else if c.eat_punct(">") {
            v = (v > parse_shift(c, eval)?) as i64;
        } else {
            break;
        }
    }
    Ok(v)
}

fn parse_shift(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_additive(c, eval)?;
    loop {
        if c.eat_punct("<<") {
            v = v.wrapping_shl(parse_additive(c, eval)? as u32 & 63);
        } else if c.eat_punct(">>") {
            v = v.wrapping_shr(parse_additive(c, eval)? as u32 & 63);
        } else {
            break;
        }
    }
    Ok(v)
}

fn parse_additive(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_multiplicative(c, eval)?;
    loop {
        if c.eat_punct("+") {
            v = v.wrapping_add(parse_multiplicative(c, eval)?);
        } else if c.eat_punct("-") {
            v = v.wrapping_sub(parse_multiplicative(c, eval)?);
        } else {
            break;
        }
    }
    Ok(v)
}

fn parse_multiplicative(c: &mut Cursor, eval: bool) -> PResult {
    let mut v = parse_unary(c, eval)?;
    loop {
        if c.eat_punct("*") {
            v = v.wrapping_mul(parse_unary(c, eval)?);
        } else if c.eat_punct("/") {
            let rhs = parse_unary(c, eval)?;
            if eval {
                if rhs == 0 {
                    return Err(EvalError("division by zero".into()));
                }
                v = v.wrapping_div(rhs);
            }
        } else if c.eat_punct("%") {
            let rhs = parse_unary(c, eval)?;
            if eval {
                if rhs == 0 {
                    return Err(EvalError("modulo by zero".into()));
                }
                v = v.wrapping_rem(rhs);
            }
        } else {
            break;
        }
    }
    Ok(v)
}

fn parse_unary(c: &mut Cursor, eval: bool) -> PResult {
    if c.eat_punct("+") {
        return parse_unary(c, eval);
    }
    if c.eat_punct("-") {
        return Ok(parse_unary(c, eval)?.wrapping_neg());
    }
    if c.eat_punct("!") {
        return Ok((parse_unary(c, eval)? == 0) as i64);
    }
    if c.eat_punct("~") {
        return Ok(!parse_unary(c, eval)?);
    }
    parse_primary(c, eval)
}

fn parse_primary(c: &mut Cursor, eval: bool) -> PResult {
    if c.eat_punct("(") {
        let v = parse_comma(c, eval)?;
        if !c.eat_punct(")") {
            return Err(EvalError("expected ')'".into()));
        }
        return Ok(v);
    }
    let Some(tok) = c.bump() else {
        return Err(EvalError("unexpected end of expression".into()));
    };
    match tok.kind {
        TokenKind::Number => parse_int_literal(&tok.spelling),
        TokenKind::CharLiteral => parse_char_literal(&tok.spelling),
        // An identifier surviving macro expansion is literal 0, per C.
        TokenKind::Identifier => Ok(0),
        _ => Err(EvalError(format!("unexpected token '{}' in expression", tok.spelling))),
    }
}

fn parse_int_literal(spelling: &str) -> PResult {
    let s = spelling.trim_end_matches(['u', 'U', 'l', 'L']);
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2)
    } else if s.len() > 1 && s.starts_with('0') {
        u64::from_str_radix(&s[1..], 8)
    } else {
        s.parse::<u64>()
    };
    value
        .map(|v| v as i64)
        .map_err(|_| EvalError(format!("invalid integer literal '{spelling}'")))
}

fn parse_char_literal(spelling: &str) -> PResult {
    let inner = spelling.trim_matches('\'');
    let mut chars = inner.chars();
    let c = match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some('"') => '"',
            Some(other) => other,
            None => return Err(EvalError("empty character literal".into())),
        },
        Some(c) => c,
        None => return Err(EvalError("empty character literal".into())),
    };
    Ok(c as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{MacroDefinition, MacroKind};
    use crate::pp_lex::tokenize;
    use cbi_span::FileRegistry;
    use std::path::Path;

    fn loc() -> PhysicalLine {
        let reg = FileRegistry::new();
        PhysicalLine::new(reg.intern(Path::new("f.c")), 1)
    }

    #[test]
    fn defined_undefined_short_circuits_and_is_false() {
        let table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        let tokens = tokenize("defined(X) && X > 0");
        assert!(!evaluate(&tokens, &table, loc(), &mut diags));
        assert!(diags.is_empty(), "short-circuited && must not raise an expression error");
    }

    #[test]
    fn division_by_zero_is_false_with_a_warning() {
        let table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        let tokens = tokenize("1 / 0");
        assert!(!evaluate(&tokens, &table, loc(), &mut diags));
        assert!(!diags.is_empty());
    }

    #[test]
    fn short_circuited_side_need_not_be_well_formed() {
        let table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        // The right side would divide by zero if evaluated; it must not be.
        let tokens = tokenize("0 && (1 / 0)");
        assert!(!evaluate(&tokens, &table, loc(), &mut diags));
        assert!(diags.is_empty());
    }

    #[test]
    fn hex_and_octal_literals() {
        let table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        assert!(evaluate(&tokenize("0x10 == 16"), &table, loc(), &mut diags));
        assert!(evaluate(&tokenize("010 == 8"), &table, loc(), &mut diags));
    }

    #[test]
    fn defined_without_parens() {
        let mut table = MacroTable::new();
        let mut diags = DiagnosticSink::new();
        table.define(
            MacroDefinition { name: "X".into(), kind: MacroKind::Object, replacement: vec![] },
            loc(),
            &mut diags,
        );
        assert!(evaluate(&tokenize("defined X"), &table, loc(), &mut diags));
    }
}
