use regex::Regex;
use std::sync::OnceLock;

/// Base token for identifiers added to elements that have none
pub const GENERATED_ID: &str = "generated";

/// Identifier given to the top of a trigger copy that has none
pub const COPY_ID: &str = "new";

/// Name given to a trigger copy whose template has no name
pub const DEFAULT_NAME: &str = "New";

fn id_index() -> &'static Regex {
    static ID_INDEX: OnceLock<Regex> = OnceLock::new();
    ID_INDEX.get_or_init(|| Regex::new(r"^(.+)-([0-9]+)$").expect("valid id pattern"))
}

fn name_index() -> &'static Regex {
    static NAME_INDEX: OnceLock<Regex> = OnceLock::new();
    NAME_INDEX.get_or_init(|| Regex::new(r"^(.+) \(([0-9]+)\)$").expect("valid name pattern"))
}

/// `event` → `event-1`, `event-1` → `event-2`
pub fn next_id_candidate(id: &str) -> String {
    bump(id_index(), id, |base, n| format!("{}-{}", base, n), |id| format!("{}-1", id))
}

/// `Goal` → `Goal (1)`, `Goal (1)` → `Goal (2)`
pub fn next_name_candidate(name: &str) -> String {
    bump(name_index(), name, |base, n| format!("{} ({})", base, n), |name| format!("{} (1)", name))
}

fn bump(
    pattern: &Regex,
    value: &str,
    numbered: impl Fn(&str, u64) -> String,
    first: impl Fn(&str) -> String,
) -> String {
    if let Some(captures) = pattern.captures(value) {
        let base = captures.get(1).map(|m| m.as_str()).unwrap_or(value);
        if let Some(n) = captures.get(2).and_then(|m| m.as_str().parse::<u64>().ok()) {
            if let Some(next) = n.checked_add(1) {
                return numbered(base, next);
            }
        }
    }
    first(value)
}

/// Starting from `candidate`, bump the `-N` suffix until `taken` says no
pub fn allocate_id(candidate: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut id = candidate.to_string();
    while taken(&id) {
        id = next_id_candidate(&id);
    }
    id
}

/// Starting from `candidate`, bump the ` (N)` suffix until `taken` says no
pub fn allocate_name(candidate: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut name = candidate.to_string();
    while taken(&name) {
        name = next_name_candidate(&name);
    }
    name
}
