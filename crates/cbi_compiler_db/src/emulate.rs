use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::config::{Action, CompilerConfig, ConfigDatabase, ConfigError};

/// Per-translation-unit output of the Compiler Emulator: `{file,
/// predefines, include_paths, include_files}` from `COMPILER EMULATOR`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmulatedArgs {
    pub predefines: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub include_files: Vec<PathBuf>,
}

/// Parses `command` (a shell-style string) for `compiler_name`'s
/// configuration and produces the effective defines/include paths/
/// include files for that invocation.
///
/// Unrecognised flags are silently ignored (`COMPILER EMULATOR`): an
/// unknown compiler binary still gets *some* analysis, just with no
/// predefines contributed by flags the config doesn't describe.
pub fn emulate(
    db: &ConfigDatabase,
    compiler_name: &str,
    argv: &[String],
) -> Result<EmulatedArgs, ConfigError> {
    let cfg = db.resolve(compiler_name)?;
    let buckets = apply_rules(cfg, argv);
    Ok(assemble(cfg, &buckets))
}

pub fn split_command(command: &str) -> Vec<String> {
    shell_words::split(command).unwrap_or_else(|_| command.split_whitespace().map(String::from).collect())
}

#[derive(Debug, Default)]
struct Buckets {
    lists: HashMap<String, Vec<String>>,
    bools: HashMap<String, bool>,
}

impl Buckets {
    fn append(&mut self, dest: &str, value: String) {
        self.lists.entry(dest.to_string()).or_default().push(value);
    }

    fn store(&mut self, dest: &str, value: String) {
        self.lists.insert(dest.to_string(), vec![value]);
    }
}

fn apply_rules(cfg: &CompilerConfig, argv: &[String]) -> Buckets {
    let mut buckets = Buckets::default();
    let mut i = 0;
    // argv[0] is the compiler path itself; skip it if present and it
    // does not itself match a rule (compiler configs describe flags,
    // not the driver name).
    if i < argv.len() && !argv[i].starts_with('-') {
        i += 1;
    }
    while i < argv.len() {
        let arg = &argv[i];
        let mut matched = false;
        for rule in &cfg.parser {
            let Some((attached, consumed_next)) = match_flag(&rule.flag, arg, argv.get(i + 1)) else {
                continue;
            };
            matched = true;
            apply_action(&mut buckets, rule, attached);
            i += if consumed_next { 2 } else { 1 };
            break;
        }
        if !matched {
            i += 1;
        }
    }
    buckets
}

/// Returns `Some((value, consumed_next_arg))` if `flag` matches `arg`,
/// where `value` is the flag's attached argument (from `=value`, direct
/// concatenation as in `-Ipath`, or the following argv element).
fn match_flag(flag: &str, arg: &str, next: Option<&String>) -> Option<(Option<String>, bool)> {
    if arg == flag {
        return Some((next.cloned(), next.is_some()));
    }
    if let Some(rest) = arg.strip_prefix(flag) {
        if let Some(eq) = rest.strip_prefix('=') {
            return Some((Some(eq.to_string()), false));
        }
        if !rest.is_empty() {
            return Some((Some(rest.to_string()), false));
        }
    }
    None
}

fn apply_action(buckets: &mut Buckets, rule: &crate::config::ParserRule, attached: Option<String>) {
    match rule.action {
        Action::StoreConst => {
            let v = rule.value.clone().unwrap_or_default();
            buckets.store(&rule.dest, v);
        }
        Action::AppendConst => {
            let v = rule.value.clone().unwrap_or_default();
            buckets.append(&rule.dest, v);
        }
        Action::Store => {
            buckets.store(&rule.dest, attached.unwrap_or_default());
        }
        Action::Append => {
            buckets.append(&rule.dest, attached.unwrap_or_default());
        }
        Action::StoreSplit => {
            let sep = rule.separator.clone().unwrap_or_else(|| ",".to_string());
            let value = attached.unwrap_or_default();
            for part in value.split(sep.as_str()) {
                let formatted = match &rule.template {
                    Some(t) => t.replace("$value", part),
                    None => part.to_string(),
                };
                buckets.append(&rule.dest, formatted);
            }
        }
        Action::StoreTrue => {
            buckets.bools.insert(rule.dest.clone(), true);
        }
        Action::StoreFalse => {
            buckets.bools.insert(rule.dest.clone(), false);
        }
    }
    if rule.override_previous {
        if let Some(list) = buckets.lists.get_mut(&rule.dest) {
            if list.len() > 1 {
                let last = list.pop().unwrap();
                list.clear();
                list.push(last);
            }
        }
    }
}

fn assemble(cfg: &CompilerConfig, buckets: &Buckets) -> EmulatedArgs {
    let mut predefines: Vec<String> = buckets.lists.get("defines").cloned().unwrap_or_default();
    let mut include_paths: Vec<PathBuf> = buckets
        .lists
        .get("include_paths")
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let mut include_files: Vec<PathBuf> = buckets
        .lists
        .get("include_files")
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect();

    let active_modes: HashSet<String> =
        buckets.lists.get("modes").cloned().unwrap_or_default().into_iter().collect();

    for mode in &cfg.modes {
        if active_modes.contains(&mode.name) {
            predefines.extend(mode.defines.iter().cloned());
            include_paths.extend(mode.include_paths.iter().map(PathBuf::from));
            include_files.extend(mode.include_files.iter().map(PathBuf::from));
        }
    }
    for pass in &cfg.passes {
        if pass.requires_modes.iter().all(|m| active_modes.contains(m)) {
            predefines.extend(pass.defines.iter().cloned());
            include_paths.extend(pass.include_paths.iter().map(PathBuf::from));
            include_files.extend(pass.include_files.iter().map(PathBuf::from));
        }
    }

    EmulatedArgs { predefines, include_paths, include_files }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openmp_flag_turns_into_define_and_mode() {
        let db = ConfigDatabase::with_shipped_defaults();
        let argv = split_command("/usr/bin/c++ -fopenmp -DFOO=3 -I./inc -c f.cpp");
        let out = emulate(&db, "c++", &argv).unwrap();
        assert!(out.predefines.contains(&"_OPENMP".to_string()));
        assert!(out.predefines.contains(&"FOO=3".to_string()));
        assert!(out.include_paths.contains(&PathBuf::from("./inc")));
    }

    #[test]
    fn sycl_pass_requires_its_mode() {
        let db = ConfigDatabase::with_shipped_defaults();
        let argv = split_command("icx -fsycl -c f.cpp");
        let out = emulate(&db, "icx", &argv).unwrap();
        assert!(out.predefines.contains(&"__SPIR__".to_string()));
    }

    #[test]
    fn unrecognised_flags_are_ignored_not_fatal() {
        let db = ConfigDatabase::with_shipped_defaults();
        let argv = split_command("gcc --totally-made-up-flag -DFOO -c f.c");
        let out = emulate(&db, "gcc", &argv).unwrap();
        assert!(out.predefines.contains(&"FOO".to_string()));
    }
}
