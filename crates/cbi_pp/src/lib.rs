//! Macro table, hide-set expansion, and `#if` constant expression
//! evaluation. Operates purely on token streams; it knows nothing about
//! files, includes, or trees.

mod directive;
mod expr;
mod macros;
mod pp_lex;
mod token;

pub use directive::{parse_define, parse_predefine};
pub use expr::evaluate;
pub use macros::{expand, MacroDefinition, MacroKind, MacroTable};
pub use pp_lex::{spell, tokenize};
pub use token::{HideSet, Token, TokenKind};
