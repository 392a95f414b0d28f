//! # Attribute Value Templates
//!
//! Parameter values may contain one `{expr}` that is computed when the value
//! is stored:
//!
//! ```text
//! {tt:clock(.)}    seconds since the context element's tls:epoch
//! {tt:clock(..)}   same, for the parent element
//! {tt:value()}     the value the user entered
//! {<path>}         text of the elements matching <path> from the root
//! ```
//!
//! Only the first template in a value is substituted.

use regex::Regex;
use std::sync::OnceLock;
use timeline_tree::TreeStore;
use tracing::{debug, error, warn};

fn interpolation() -> &'static Regex {
    static INTERPOLATION: OnceLock<Regex> = OnceLock::new();
    INTERPOLATION.get_or_init(|| Regex::new(r"\{[^}]+\}").expect("valid interpolation pattern"))
}

/// Everything a template can refer to
pub struct AvtContext<'a> {
    pub store: &'a TreeStore,
    pub now: f64,
    /// `tls:epoch` of the context element
    pub context_epoch: Option<&'a str>,
    /// `tls:epoch` of the parent element
    pub parent_epoch: Option<&'a str>,
    pub user_value: &'a str,
}

impl AvtContext<'_> {
    fn clock(&self, epoch: Option<&str>) -> String {
        let Some(epoch) = epoch else {
            debug!("no tls:epoch, clock is 0");
            return "0".to_string();
        };
        match epoch.trim().parse::<f64>() {
            Ok(epoch) => format!("{}", self.now - epoch),
            Err(_) => {
                warn!(epoch, "non-numeric tls:epoch, clock is 0");
                "0".to_string()
            }
        }
    }

    fn lookup(&self, expr: &str) -> Option<String> {
        let matched = self.store.find_all(self.store.root(), expr).ok()?;
        if matched.is_empty() {
            return None;
        }
        let mut value = String::new();
        for key in matched {
            if let Ok(node) = self.store.node(key) {
                for part in [&node.text, &node.tail].into_iter().flatten() {
                    value.push_str(part.trim());
                }
            }
        }
        Some(value)
    }
}

pub fn has_template(value: &str) -> bool {
    interpolation().is_match(value)
}

/// Substitute the first `{expr}` in `value`
pub fn substitute(value: &str, context: &AvtContext<'_>) -> String {
    let Some(found) = interpolation().find(value) else {
        return value.to_string();
    };
    let expr = &value[found.start() + 1..found.end() - 1];
    let computed = match expr.strip_prefix("tt:").unwrap_or(expr) {
        "clock(.)" => context.clock(context.context_epoch),
        "clock(..)" => context.clock(context.parent_epoch),
        "value()" => context.user_value.to_string(),
        _ => match context.lookup(expr) {
            Some(text) => text,
            None => {
                error!(value, "Unexpected AVT");
                format!("{{{}}}", expr)
            }
        },
    };
    format!("{}{}{}", &value[..found.start()], computed, &value[found.end()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline_tree::NamespaceTable;

    const DOC: &str = r#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" xmlns:tt="http://jackjansen.nl/2immerse/livetrigger">
  <tt:variables><tt:team>Ajax</tt:team><tt:team> PSV </tt:team></tt:variables>
</tl:document>"#;

    fn store() -> TreeStore {
        TreeStore::parse(DOC.as_bytes(), &NamespaceTable::standard()).unwrap()
    }

    fn context<'a>(store: &'a TreeStore, epoch: Option<&'a str>) -> AvtContext<'a> {
        AvtContext {
            store,
            now: 10.0,
            context_epoch: epoch,
            parent_epoch: Some("4"),
            user_value: "Messi",
        }
    }

    #[test]
    fn test_value_and_clock() {
        let store = store();
        let ctx = context(&store, Some("7.5"));
        assert_eq!(substitute("Goal by {tt:value()}!", &ctx), "Goal by Messi!");
        assert_eq!(substitute("{value()}", &ctx), "Messi");
        assert_eq!(substitute("{tt:clock(.)}", &ctx), "2.5");
        assert_eq!(substitute("at {tt:clock(..)}", &ctx), "at 6");
        assert_eq!(substitute("{tt:clock(.)}", &context(&store, None)), "0");
    }

    #[test]
    fn test_path_lookup() {
        let store = store();
        let ctx = context(&store, None);
        assert_eq!(substitute("{.//tt:team}", &ctx), "AjaxPSV");
        assert_eq!(substitute("{.//tt:missing}", &ctx), "{.//tt:missing}");
    }

    #[test]
    fn test_only_first_template() {
        let store = store();
        let ctx = context(&store, None);
        assert_eq!(substitute("{tt:value()} {tt:value()}", &ctx), "Messi {tt:value()}");
        assert_eq!(substitute("plain", &ctx), "plain");
        assert!(!has_template("{}"));
    }
}
