use std::collections::{BTreeMap, BTreeSet};

use cbi_pp::{evaluate, parse_predefine, MacroTable};
use cbi_span::{DiagnosticSink, PhysicalLine};

use crate::node::{BranchCondition, FileNode, IncludeResolution, Node};

/// Physical line -> the set of platform names whose configuration keeps
/// that line live, per `DATA MODEL`. Monotonic: once a platform claims a
/// line, merging further platform walks only ever adds to its set.
#[derive(Debug, Default, Clone)]
pub struct PlatformSetMap {
    lines: BTreeMap<PhysicalLine, BTreeSet<String>>,
}

impl PlatformSetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, line: PhysicalLine, platform: &str) {
        self.lines.entry(line).or_default().insert(platform.to_string());
    }

    pub fn platforms_for(&self, line: PhysicalLine) -> Option<&BTreeSet<String>> {
        self.lines.get(&line)
    }

    pub fn merge(&mut self, other: PlatformSetMap) {
        for (line, platforms) in other.lines {
            self.lines.entry(line).or_default().extend(platforms);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PhysicalLine, &BTreeSet<String>)> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Walks `tree` once for `platform`, seeding macro state from
/// `predefines`, and marks every physical line reached by a live branch
/// in `map`.
///
/// This is a fresh walk with fresh macro state every time
/// (`CONCURRENCY & RESOURCE MODEL`): the tree built once per translation
/// unit is read-only; all mutation during mapping is local to this call.
pub fn map_platform(tree: &FileNode, predefines: &[String], platform: &str, map: &mut PlatformSetMap, diags: &mut DiagnosticSink) {
    let mut table = MacroTable::new();
    let cmdline = PhysicalLine::new(tree.file, 0);
    for entry in predefines {
        if let Some(def) = parse_predefine(entry) {
            table.define(def, cmdline, diags);
        }
    }
    walk_file(tree, &mut table, platform, map, diags);
}

fn walk_file(node: &FileNode, table: &mut MacroTable, platform: &str, map: &mut PlatformSetMap, diags: &mut DiagnosticSink) {
    walk_children(&node.children, table, platform, map, diags);
}

fn walk_children(children: &[Node], table: &mut MacroTable, platform: &str, map: &mut PlatformSetMap, diags: &mut DiagnosticSink) {
    for child in children {
        match child {
            Node::Code(range) => {
                for line in &range.lines {
                    map.mark(*line, platform);
                }
            }
            Node::If(group) => walk_if_group(group, table, platform, map, diags),
            Node::Include(edge) => walk_include(edge, table, platform, map, diags),
            Node::Macro(edit, at) => apply_macro_edit(edit, *at, table, diags),
        }
    }
}

fn apply_macro_edit(edit: &crate::node::MacroEdit, at: PhysicalLine, table: &mut MacroTable, diags: &mut DiagnosticSink) {
    match edit {
        crate::node::MacroEdit::Define(def) => table.define(def.clone(), at, diags),
        crate::node::MacroEdit::Undef(name) => table.undef(name),
    }
}

fn walk_if_group(
    group: &crate::node::IfGroup,
    table: &mut MacroTable,
    platform: &str,
    map: &mut PlatformSetMap,
    diags: &mut DiagnosticSink,
) {
    for branch in &group.branches {
        let live = match &branch.condition {
            BranchCondition::Else => true,
            BranchCondition::If(tokens) => evaluate(tokens, table, branch.at, diags),
        };
        if live {
            walk_children(&branch.body, table, platform, map, diags);
            return;
        }
    }
}

fn walk_include(
    edge: &crate::node::IncludeEdge,
    table: &mut MacroTable,
    platform: &str,
    map: &mut PlatformSetMap,
    diags: &mut DiagnosticSink,
) {
    match &edge.resolution {
        IncludeResolution::Resolved { tree, .. } => walk_file(tree, table, platform, map, diags),
        IncludeResolution::GuardSkipped { .. } | IncludeResolution::Cycle { .. } | IncludeResolution::NotFound => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_translation_unit, BuildConfig};
    use crate::source_cache::SourceCache;
    use cbi_span::FileRegistry;
    use std::io::Write;

    #[test]
    fn ifdef_branch_only_marks_the_live_platform() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(f, "#ifdef GPU\nint gpu_path;\n#else\nint cpu_path;\n#endif").unwrap();

        let cache = SourceCache::new(FileRegistry::new());
        let (tree, mut diags) = build_translation_unit(&cache, &main, &BuildConfig::default());

        let mut map = PlatformSetMap::new();
        map_platform(&tree, &["GPU".to_string()], "gpu-build", &mut map, &mut diags);
        map_platform(&tree, &[], "cpu-build", &mut map, &mut diags);

        let gpu_line = PhysicalLine::new(tree.file, 2);
        let cpu_line = PhysicalLine::new(tree.file, 4);
        assert!(map.platforms_for(gpu_line).unwrap().contains("gpu-build"));
        assert!(!map.platforms_for(gpu_line).unwrap().contains("cpu-build"));
        assert!(map.platforms_for(cpu_line).unwrap().contains("cpu-build"));
        assert!(!map.platforms_for(cpu_line).unwrap().contains("gpu-build"));
    }

    #[test]
    fn shared_code_outside_any_conditional_is_claimed_by_every_platform() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(f, "int shared;\n").unwrap();

        let cache = SourceCache::new(FileRegistry::new());
        let (tree, mut diags) = build_translation_unit(&cache, &main, &BuildConfig::default());
        let mut map = PlatformSetMap::new();
        for platform in ["a", "b", "c"] {
            map_platform(&tree, &[], platform, &mut map, &mut diags);
        }
        let line = PhysicalLine::new(tree.file, 1);
        assert_eq!(map.platforms_for(line).unwrap().len(), 3);
    }

    #[test]
    fn define_in_a_dead_branch_does_not_leak_into_the_live_one() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(
            f,
            "#ifdef GPU\n#define WIDTH 256\n#else\n#define WIDTH 64\n#endif\n#if WIDTH == 256\nint wide;\n#endif"
        )
        .unwrap();

        let cache = SourceCache::new(FileRegistry::new());
        let (tree, mut diags) = build_translation_unit(&cache, &main, &BuildConfig::default());

        let mut map = PlatformSetMap::new();
        map_platform(&tree, &[], "cpu-build", &mut map, &mut diags);
        let wide_line = PhysicalLine::new(tree.file, 7);
        assert!(map.platforms_for(wide_line).is_none(), "WIDTH must resolve to 64 on the cpu build");

        let mut gpu_map = PlatformSetMap::new();
        map_platform(&tree, &["GPU".to_string()], "gpu-build", &mut gpu_map, &mut diags);
        assert!(gpu_map.platforms_for(wide_line).unwrap().contains("gpu-build"));
    }

    #[test]
    fn command_line_name_equals_value_predefine_reaches_if() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(f, "#if FOO == 3\nint three;\n#else\nint other;\n#endif").unwrap();

        let cache = SourceCache::new(FileRegistry::new());
        let (tree, mut diags) = build_translation_unit(&cache, &main, &BuildConfig::default());

        let mut map = PlatformSetMap::new();
        map_platform(&tree, &["FOO=3".to_string()], "build", &mut map, &mut diags);

        let three_line = PhysicalLine::new(tree.file, 2);
        let other_line = PhysicalLine::new(tree.file, 4);
        assert!(map.platforms_for(three_line).unwrap().contains("build"));
        assert!(map.platforms_for(other_line).is_none());
    }

    #[test]
    fn self_referential_macro_chain_leaves_q_live_p_dead() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        let mut f = std::fs::File::create(&main).unwrap();
        writeln!(
            f,
            "#define BAR 1\n#define FOO BAR\n#undef BAR\n#define BAR FOO\n#if FOO == 1\nint p;\n#else\nint q;\n#endif"
        )
        .unwrap();

        let cache = SourceCache::new(FileRegistry::new());
        let (tree, mut diags) = build_translation_unit(&cache, &main, &BuildConfig::default());

        let mut map = PlatformSetMap::new();
        map_platform(&tree, &[], "build", &mut map, &mut diags);

        let p_line = PhysicalLine::new(tree.file, 6);
        let q_line = PhysicalLine::new(tree.file, 8);
        // Hide sets block full re-expansion of this self-referential chain,
        // so `FOO` survives as a bare identifier and the evaluator treats
        // it as 0: `Q` is live, `P` is dead (see DESIGN.md).
        assert!(map.platforms_for(p_line).is_none());
        assert!(map.platforms_for(q_line).unwrap().contains("build"));
    }
}
