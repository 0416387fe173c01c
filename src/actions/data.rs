//! Data actions: `setvar` and macro expansion.

use crate::operators::MacroExpander;
use crate::parser::{SetVarSpec, SetVarValue};
use crate::variables::{parse_selector, VariableStore};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static MACRO: Lazy<Regex> = Lazy::new(|| Regex::new(r"%\{([^}]+)\}").unwrap());

/// `%{VAR}` and `%{COLLECTION.key}` expansion against the live store.
///
/// Unknown variable names stay literal. Known but undefined ones expand to
/// the empty string. Collections expand to their first member.
impl MacroExpander for VariableStore {
    fn expand<'a>(&self, template: &'a str) -> Cow<'a, str> {
        if !template.contains("%{") {
            return Cow::Borrowed(template);
        }
        MACRO.replace_all(template, |caps: &Captures<'_>| {
            match parse_selector(&caps[1]) {
                Some(spec) => self
                    .lookup(&spec)
                    .into_iter()
                    .next()
                    .map(|(_, v)| v)
                    .unwrap_or_default(),
                None => caps[0].to_string(),
            }
        })
    }
}

/// Execute one `setvar`. Only the TX collection is writable.
pub fn apply_setvar(store: &mut VariableStore, spec: &SetVarSpec) {
    if spec.collection != "tx" {
        tracing::debug!(collection = %spec.collection, "setvar on unsupported collection ignored");
        return;
    }

    let key = store.expand(&spec.key).to_ascii_lowercase();
    match &spec.value {
        SetVarValue::Assign(template) => {
            let value = store.expand(template).into_owned();
            tracing::trace!(%key, %value, "setvar");
            store.tx_mut().set(key, value);
        }
        SetVarValue::Add(template) => {
            let delta = numeric(&store.expand(template));
            store.tx_mut().add_numeric(&key, delta);
        }
        SetVarValue::Subtract(template) => {
            let delta = numeric(&store.expand(template));
            store.tx_mut().add_numeric(&key, delta.saturating_neg());
        }
        SetVarValue::Delete => {
            store.tx_mut().remove(&key);
        }
    }
}

fn numeric(text: &str) -> i64 {
    text.trim().parse().unwrap_or_else(|_| {
        tracing::debug!(value = text, "non-numeric setvar operand treated as 0");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::CookieFormat;

    fn setvar(collection: &str, key: &str, value: SetVarValue) -> SetVarSpec {
        SetVarSpec {
            collection: collection.into(),
            key: key.into(),
            value,
        }
    }

    #[test]
    fn test_expand_macros() {
        let mut store = VariableStore::new("abc");
        store
            .request_mut()
            .set_request_line("/a?id=7", "GET", "HTTP/1.1", '&');
        store
            .request_mut()
            .add_header("Host", "example.com", CookieFormat::V0);
        store.tx_mut().set("score", "5");

        assert_eq!(store.expand("plain"), "plain");
        assert_eq!(store.expand("%{REQUEST_METHOD} %{ARGS.id}"), "GET 7");
        assert_eq!(store.expand("score=%{tx.score}"), "score=5");
        assert_eq!(store.expand("[%{TX.missing}]"), "[]");
        assert_eq!(store.expand("%{NOPE}"), "%{NOPE}");
        assert_eq!(store.expand("%{UNIQUE_ID}"), "abc");
    }

    #[test]
    fn test_setvar_operations() {
        let mut store = VariableStore::new("x");
        apply_setvar(&mut store, &setvar("tx", "Score", SetVarValue::Assign("3".into())));
        apply_setvar(&mut store, &setvar("tx", "score", SetVarValue::Add("4".into())));
        assert_eq!(store.tx().get("score"), Some("7"));

        apply_setvar(&mut store, &setvar("tx", "score", SetVarValue::Subtract("10".into())));
        assert_eq!(store.tx().get("score"), Some("-3"));

        apply_setvar(&mut store, &setvar("tx", "score", SetVarValue::Delete));
        assert_eq!(store.tx().get("score"), None);
    }

    #[test]
    fn test_setvar_expands_key_and_value() {
        let mut store = VariableStore::new("x");
        store.tx_mut().set("name", "anomaly");
        store.tx_mut().set("points", "5");
        apply_setvar(
            &mut store,
            &setvar("tx", "%{tx.name}_score", SetVarValue::Add("%{tx.points}".into())),
        );
        assert_eq!(store.tx().get("anomaly_score"), Some("5"));
    }

    #[test]
    fn test_setvar_other_collections_ignored() {
        let mut store = VariableStore::new("x");
        apply_setvar(&mut store, &setvar("ip", "block", SetVarValue::Assign("1".into())));
        assert!(store.tx().is_empty());
    }
}
