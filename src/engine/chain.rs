//! Rule chaining logic.

use super::ruleset::CompiledRule;

/// Evaluate a chain link by link.
///
/// `eval_link` is called for the head first and for each follower only
/// while every previous link matched. The chain matches when all links do.
pub fn evaluate_chain<F>(head: &CompiledRule, mut eval_link: F) -> bool
where
    F: FnMut(&CompiledRule) -> bool,
{
    for (depth, link) in head.links().enumerate() {
        if !eval_link(link) {
            tracing::trace!(rule_id = ?head.id, depth, "chain broken");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CompiledRuleset;
    use crate::engine::Phase;

    fn head() -> CompiledRule {
        let set = CompiledRuleset::from_string(
            r#"
            SecRule ARGS "@rx a" "id:1,phase:1,deny,chain"
            SecRule ARGS "@rx b" "chain"
            SecRule ARGS "@rx c" "setvar:tx.x=1"
        "#,
        )
        .unwrap();
        set.rules(Phase::RequestHeaders)[0].clone()
    }

    #[test]
    fn test_all_links_must_match() {
        let head = head();
        let mut seen = Vec::new();
        assert!(evaluate_chain(&head, |link| {
            seen.push(link.operator.argument().to_string());
            true
        }));
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_successor_skipped_after_mismatch() {
        let head = head();
        let mut calls = 0;
        assert!(!evaluate_chain(&head, |link| {
            calls += 1;
            link.operator.argument() != "b"
        }));
        assert_eq!(calls, 2);
    }
}
