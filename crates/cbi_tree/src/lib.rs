//! The Specialization Tree Builder and Platform Mapper.
//!
//! A tree is built once per translation unit from the lexer's logical
//! lines and the macro table's definitions (`COMPONENT DESIGN`): every
//! branch of every `#if` is captured structurally, none evaluated yet.
//! The mapper then walks that tree once per platform with fresh macro
//! state, the only place branch conditions are actually decided.

mod builder;
mod include;
mod mapper;
mod node;
mod source_cache;

pub use builder::{build_translation_unit, BuildConfig};
pub use include::{parse_include_literal, resolve_include};
pub use mapper::{map_platform, PlatformSetMap};
pub use node::{Branch, BranchCondition, CodeRange, FileNode, IfGroup, IncludeEdge, IncludeResolution, MacroEdit, Node};
pub use source_cache::SourceCache;
