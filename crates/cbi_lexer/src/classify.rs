use crate::lang::{LexConfig, Language};
use crate::reader::SourceText;

/// What a [`LogicalLine`] contains once comments are stripped and
/// continuations are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Directive,
    Code,
    /// Blank or comment-only; contributes to no `CodeRange`.
    Blank,
}

/// One logical line: a run of physical lines joined by continuation,
/// with comments stripped from `text`.
///
/// `physical` always lists at least one physical line number, in
/// ascending order, so attribution can walk back from a logical line to
/// every physical line it covers.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    pub physical: Vec<u32>,
    pub kind: LineKind,
    pub directive_name: Option<String>,
    pub text: String,
}

impl LogicalLine {
    pub fn first_physical(&self) -> u32 {
        self.physical[0]
    }
}

/// Language-aware classifier: folds continuations, strips comments, and
/// tags each resulting logical line as directive/code/blank.
pub struct Lexer {
    config: LexConfig,
}

impl Lexer {
    pub fn new(config: LexConfig) -> Self {
        Self { config }
    }

    pub fn lex(&self, source: &SourceText) -> Vec<LogicalLine> {
        let spans = fold_continuations(source, self.config.language);
        let mut out = Vec::with_capacity(spans.len());
        let mut in_block_comment = false;
        for span in spans {
            let line = classify_span(span, self.config, &mut in_block_comment);
            out.push(line);
        }
        out
    }
}

/// A joined run of physical lines before comment/directive classification.
struct RawSpan {
    physical: Vec<u32>,
    text: String,
}

fn fold_continuations(source: &SourceText, lang: Language) -> Vec<RawSpan> {
    match lang {
        Language::C | Language::Cxx => fold_backslash_continuations(source),
        Language::FortranFree => fold_fortran_free(source),
        Language::FortranFixed => fold_fortran_fixed(source),
    }
}

fn fold_backslash_continuations(source: &SourceText) -> Vec<RawSpan> {
    let mut out = Vec::new();
    let mut line_no = 1u32;
    let total = source.line_count();
    while line_no <= total {
        let mut physical = vec![line_no];
        let mut text = source.line(line_no).unwrap_or("").to_string();
        while ends_with_unescaped_backslash(&text) {
            let next = line_no + 1;
            if next > total {
                text.pop();
                break;
            }
            text.pop();
            text.push_str(source.line(next).unwrap_or(""));
            physical.push(next);
            line_no = next;
        }
        line_no += 1;
        out.push(RawSpan { physical, text });
    }
    out
}

fn ends_with_unescaped_backslash(text: &str) -> bool {
    let trimmed = text.trim_end_matches([' ', '\t']);
    trimmed.ends_with('\\') && !trimmed.ends_with("\\\\")
}

fn fold_fortran_free(source: &SourceText) -> Vec<RawSpan> {
    let mut out = Vec::new();
    let mut line_no = 1u32;
    let total = source.line_count();
    while line_no <= total {
        let mut physical = vec![line_no];
        let mut text = source.line(line_no).unwrap_or("").to_string();
        loop {
            let trimmed_end = text.trim_end();
            if !trimmed_end.ends_with('&') || is_inside_fortran_comment_or_string(trimmed_end) {
                break;
            }
            let next = line_no + 1;
            if next > total {
                break;
            }
            // Drop trailing '&' and whatever whitespace followed it.
            let cut = trimmed_end.len() - 1;
            text.truncate(cut);
            let next_line = source.line(next).unwrap_or("");
            let next_trimmed = next_line.trim_start();
            let resumed = next_trimmed.strip_prefix('&').unwrap_or(next_trimmed);
            text.push_str(resumed);
            physical.push(next);
            line_no = next;
        }
        line_no += 1;
        out.push(RawSpan { physical, text });
    }
    out
}

/// Best-effort guard against treating a `&` that appears inside a Fortran
/// comment or string literal as a continuation marker.
fn is_inside_fortran_comment_or_string(text: &str) -> bool {
    let mut in_squote = false;
    let mut in_dquote = false;
    for c in text.chars() {
        match c {
            '!' if !in_squote && !in_dquote => return true,
            '\'' if !in_dquote => in_squote = !in_squote,
            '"' if !in_squote => in_dquote = !in_dquote,
            _ => {}
        }
    }
    false
}

fn fold_fortran_fixed(source: &SourceText) -> Vec<RawSpan> {
    let mut out = Vec::new();
    let mut line_no = 1u32;
    let total = source.line_count();
    while line_no <= total {
        let mut physical = vec![line_no];
        let mut text = fixed_form_statement_field(source.line(line_no).unwrap_or(""));
        loop {
            let next = line_no + 1;
            if next > total {
                break;
            }
            let next_line = source.line(next).unwrap_or("");
            if !is_fixed_form_continuation(next_line) {
                break;
            }
            text.push_str(&fixed_form_statement_field(next_line));
            physical.push(next);
            line_no = next;
        }
        line_no += 1;
        out.push(RawSpan { physical, text });
    }
    out
}

fn is_fixed_form_continuation(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 6 {
        return false;
    }
    let c = bytes[5] as char;
    c != ' ' && c != '0'
}

/// Columns 7+ are the statement field in classic fixed form; columns 1-5
/// are the label field and column 6 is the continuation marker.
fn fixed_form_statement_field(line: &str) -> String {
    if line.len() > 6 {
        line[6..].to_string()
    } else {
        String::new()
    }
}

fn classify_span(span: RawSpan, config: LexConfig, in_block_comment: &mut bool) -> LogicalLine {
    let lang = config.language;
    if lang.is_fortran() {
        classify_fortran(span, config, in_block_comment)
    } else {
        classify_c_like(span, in_block_comment)
    }
}

fn classify_c_like(span: RawSpan, in_block_comment: &mut bool) -> LogicalLine {
    let clean = strip_c_comments(&span.text, in_block_comment);
    finish_classification(span.physical, clean, '#')
}

/// Strips `//` and `/* … */` comments from `text`, tracking block-comment
/// state across calls so a comment spanning multiple logical lines is
/// handled correctly. String and char literals are respected so a `//`
/// or `/*` inside one does not start a comment.
fn strip_c_comments(text: &str, in_block_comment: &mut bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    let mut in_string: Option<char> = None;
    while i < chars.len() {
        if *in_block_comment {
            if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                *in_block_comment = false;
                i += 2;
                out.push(' ');
            } else {
                i += 1;
            }
            continue;
        }
        if let Some(quote) = in_string {
            out.push(chars[i]);
            if chars[i] == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if chars[i] == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match chars[i] {
            '"' | '\'' => {
                in_string = Some(chars[i]);
                out.push(chars[i]);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                break;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                *in_block_comment = true;
                i += 2;
                out.push(' ');
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn classify_fortran(span: RawSpan, config: LexConfig, _in_block_comment: &mut bool) -> LogicalLine {
    let trimmed_start = span.text.trim_start();
    let leading_ws = span.text.len() - trimmed_start.len();

    let is_comment_char = matches!(trimmed_start.chars().next(), Some('!'))
        || (leading_ws == 0
            && matches!(span.text.chars().next(), Some('c') | Some('C') | Some('*')));

    if is_comment_char {
        let (marker_len, after_marker) = if trimmed_start.starts_with('!') {
            (1, &trimmed_start[1..])
        } else {
            (1, &span.text[1..])
        };
        let _ = marker_len;
        if config.openmp_sentinels && starts_with_sentinel(after_marker) {
            let remainder = strip_sentinel(after_marker);
            return finish_classification(span.physical, format!("#{remainder}"), '#');
        }
        return LogicalLine { physical: span.physical, kind: LineKind::Blank, directive_name: None, text: String::new() };
    }

    // Fortran strings may use doubled quotes as an escaped quote; a naive
    // scan for '!' outside quotes is sufficient since CBI does not need
    // to tokenize Fortran expressions beyond directive recognition.
    let clean = strip_fortran_trailing_comment(&span.text);
    finish_classification(span.physical, clean, '#')
}

fn starts_with_sentinel(rest: &str) -> bool {
    rest.starts_with('$')
}

fn strip_sentinel(rest: &str) -> &str {
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    let rest = rest.strip_prefix("omp").unwrap_or(rest);
    rest
}

fn strip_fortran_trailing_comment(text: &str) -> String {
    let mut in_squote = false;
    let mut in_dquote = false;
    for (idx, c) in text.char_indices() {
        match c {
            '!' if !in_squote && !in_dquote => return text[..idx].to_string(),
            '\'' if !in_dquote => in_squote = !in_squote,
            '"' if !in_squote => in_dquote = !in_dquote,
            _ => {}
        }
    }
    text.to_string()
}

fn finish_classification(physical: Vec<u32>, clean: String, directive_char: char) -> LogicalLine {
    let trimmed = clean.trim_start();
    if trimmed.is_empty() {
        return LogicalLine { physical, kind: LineKind::Blank, directive_name: None, text: clean };
    }
    if trimmed.starts_with(directive_char) {
        let after_hash = trimmed[directive_char.len_utf8()..].trim_start();
        let name: String = after_hash.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        let name = if name.is_empty() { None } else { Some(name) };
        return LogicalLine { physical, kind: LineKind::Directive, directive_name: name, text: clean };
    }
    LogicalLine { physical, kind: LineKind::Code, directive_name: None, text: clean }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbi_span::FileRegistry;
    use std::io::Write;

    fn lex_text(contents: &str, lang: Language) -> Vec<LogicalLine> {
        let mut f = tempfile::Builder::new().suffix(ext_for(lang)).tempfile().unwrap();
        write!(f, "{contents}").unwrap();
        let reg = FileRegistry::new();
        let source = crate::reader::read_source(&reg, f.path()).unwrap();
        let lexer = Lexer::new(LexConfig { language: lang, openmp_sentinels: false });
        lexer.lex(&source)
    }

    fn ext_for(lang: Language) -> &'static str {
        match lang {
            Language::C => ".c",
            Language::Cxx => ".cpp",
            Language::FortranFree => ".f90",
            Language::FortranFixed => ".f",
        }
    }

    #[test]
    fn backslash_continuation_joins_directive() {
        let lines = lex_text("#define FOO \\\n  1\nint x;\n", Language::C);
        assert_eq!(lines[0].kind, LineKind::Directive);
        assert_eq!(lines[0].physical, vec![1, 2]);
        assert_eq!(lines[0].directive_name.as_deref(), Some("define"));
        assert_eq!(lines[1].kind, LineKind::Code);
    }

    #[test]
    fn line_comment_swallows_continued_text() {
        let lines = lex_text("int x; // comment \\\nstill comment\nint y;\n", Language::C);
        assert_eq!(lines[0].kind, LineKind::Code);
        assert!(lines[0].text.trim().starts_with("int x;"));
        assert_eq!(lines[0].physical, vec![1, 2]);
        assert_eq!(lines[1].kind, LineKind::Code);
    }

    #[test]
    fn block_comment_spans_logical_lines() {
        let lines = lex_text("int a; /* start\nmiddle\nend */ int b;\n", Language::C);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].kind, LineKind::Code);
        assert_eq!(lines[1].kind, LineKind::Blank);
        assert_eq!(lines[2].kind, LineKind::Code);
        assert!(lines[2].text.contains("int b;"));
    }

    #[test]
    fn directive_inside_string_is_not_a_directive() {
        let lines = lex_text("const char *s = \"#define X\";\n", Language::C);
        assert_eq!(lines[0].kind, LineKind::Code);
    }

    #[test]
    fn fortran_free_form_ampersand_continuation() {
        let lines = lex_text("x = a + &\n     b\n", Language::FortranFree);
        assert_eq!(lines[0].kind, LineKind::Code);
        assert_eq!(lines[0].physical, vec![1, 2]);
        assert!(lines[0].text.contains('b'));
    }

    #[test]
    fn fortran_comment_line_is_blank() {
        let lines = lex_text("! a full comment\nx = 1\n", Language::FortranFree);
        assert_eq!(lines[0].kind, LineKind::Blank);
        assert_eq!(lines[1].kind, LineKind::Code);
    }

    #[test]
    fn fortran_openmp_sentinel_becomes_directive_when_enabled() {
        let mut f = tempfile::Builder::new().suffix(".f90").tempfile().unwrap();
        write!(f, "!$ if defined(GPU)\nx = 1\n!$ endif\n").unwrap();
        let reg = FileRegistry::new();
        let source = crate::reader::read_source(&reg, f.path()).unwrap();
        let lexer = Lexer::new(LexConfig { language: Language::FortranFree, openmp_sentinels: true });
        let lines = lexer.lex(&source);
        assert_eq!(lines[0].kind, LineKind::Directive);
    }

    #[test]
    fn fixed_form_continuation_column_six() {
        let text = "      x = a +\n     $   b\n";
        let mut f = tempfile::Builder::new().suffix(".f").tempfile().unwrap();
        write!(f, "{text}").unwrap();
        let reg = FileRegistry::new();
        let source = crate::reader::read_source(&reg, f.path()).unwrap();
        let lexer = Lexer::new(LexConfig { language: Language::FortranFixed, openmp_sentinels: false });
        let lines = lexer.lex(&source);
        assert_eq!(lines[0].physical, vec![1, 2]);
        assert!(lines[0].text.contains('b'));
    }
}
