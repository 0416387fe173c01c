//! Rule compilation.
//!
//! Directives are folded in declaration order into an [`EngineConfig`] and
//! five immutable rule arrays, one per phase. Chain followers are nested
//! under their head so that a chain occupies one slot for `skip` counting.

use super::config::EngineConfig;
use super::phase::Phase;
use crate::actions::{BlockTarget, RuleActions};
use crate::error::{Error, Result, SourceLocation};
use crate::operators::{CompileContext, CompiledOperator};
use crate::parser::{
    Action, Directive, DisruptiveAction, OperatorName, OperatorSpec, Parser, RuleIdRange,
    VariableSpec,
};
use crate::registry::Registry;
use crate::transformations::TransformationPipeline;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule id; `None` for chain followers.
    pub id: Option<u64>,
    /// Phase the rule runs in.
    pub phase: Phase,
    /// Selectors. Empty for `SecAction`.
    pub variables: Vec<VariableSpec>,
    /// Operator with its negation flag.
    pub operator: CompiledOperator,
    /// Transformations, defaults first.
    pub transformations: TransformationPipeline,
    /// Grouped actions with phase defaults merged in.
    pub actions: RuleActions,
    /// What `block` resolves to for this rule.
    pub block: Option<BlockTarget>,
    /// Next chain link.
    pub chain: Option<Box<CompiledRule>>,
    /// Declaration site.
    pub location: String,
}

impl CompiledRule {
    /// This rule and its chain followers, in order.
    pub fn links(&self) -> impl Iterator<Item = &CompiledRule> {
        std::iter::successors(Some(self), |r| r.chain.as_deref())
    }

    /// Whether the rule has no selectors and always sees one empty value.
    pub fn is_unconditional(&self) -> bool {
        self.variables.is_empty()
    }

    fn append(&mut self, link: CompiledRule) {
        if let Some(next) = self.chain.as_mut() {
            next.append(link);
        } else {
            self.chain = Some(Box::new(link));
        }
    }
}

/// The compiled configuration: settings plus per-phase rules.
#[derive(Debug)]
pub struct CompiledRuleset {
    config: EngineConfig,
    phases: Vec<Vec<CompiledRule>>,
    markers: Vec<HashMap<String, usize>>,
}

impl CompiledRuleset {
    /// Compile rules from a string with the default registry.
    pub fn from_string(rules: &str) -> Result<Self> {
        Self::from_string_with(rules, &Registry::default())
    }

    /// Compile rules from a string.
    pub fn from_string_with(rules: &str, registry: &Registry) -> Result<Self> {
        let mut parser = Parser::new();
        parser.parse(rules)?;
        Self::compile(parser.into_directives(), registry)
    }

    /// Compile rules from a file. Includes and data files resolve relative
    /// to the file that names them.
    pub fn from_file(path: impl AsRef<Path>, registry: &Registry) -> Result<Self> {
        let mut parser = Parser::new();
        parser.parse_file(path.as_ref())?;
        Self::compile(parser.into_directives(), registry)
    }

    /// Fold parsed directives into a ruleset.
    pub fn compile(directives: Vec<Directive>, registry: &Registry) -> Result<Self> {
        let mut builder = Builder::new(registry);
        for directive in directives {
            builder.add(directive)?;
        }
        builder.finish()
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rules of `phase` in declaration order.
    pub fn rules(&self, phase: Phase) -> &[CompiledRule] {
        &self.phases[phase.index()]
    }

    /// Index of the first rule after `marker` in `phase`.
    pub fn marker(&self, phase: Phase, marker: &str) -> Option<usize> {
        self.markers[phase.index()].get(marker).copied()
    }

    /// Number of rules (chains count once).
    pub fn rule_count(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    /// Find a rule by id.
    pub fn find(&self, id: u64) -> Option<&CompiledRule> {
        self.phases
            .iter()
            .flatten()
            .find(|r| r.id == Some(id))
    }
}

struct Builder<'a> {
    registry: &'a Registry,
    config: EngineConfig,
    defaults: Vec<RuleActions>,
    phases: Vec<Vec<CompiledRule>>,
    markers: Vec<HashMap<String, usize>>,
    ids: HashSet<u64>,
    removals: Vec<RuleIdRange>,
    open_chain: Option<CompiledRule>,
}

fn default_template() -> RuleActions {
    RuleActions {
        disruptive: Some(DisruptiveAction::Pass),
        log: Some(true),
        audit_log: Some(true),
        ..RuleActions::default()
    }
}

impl<'a> Builder<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            defaults: Phase::ALL.iter().map(|_| default_template()).collect(),
            phases: Phase::ALL.iter().map(|_| Vec::new()).collect(),
            markers: Phase::ALL.iter().map(|_| HashMap::new()).collect(),
            ids: HashSet::new(),
            removals: Vec::new(),
            open_chain: None,
        }
    }

    fn add(&mut self, directive: Directive) -> Result<()> {
        let rule = match directive {
            Directive::SecRule(rule) => Some((rule.variables, rule.operator, rule.actions, rule.location)),
            Directive::SecAction(action) => Some((
                Vec::new(),
                OperatorSpec {
                    negated: false,
                    name: "unconditionalMatch".to_string(),
                    builtin: Some(OperatorName::UnconditionalMatch),
                    argument: String::new(),
                },
                action.actions,
                action.location,
            )),
            other => {
                self.close_chain()?;
                self.add_other(other)?;
                None
            }
        };

        if let Some((variables, operator, actions, location)) = rule {
            self.add_rule(variables, &operator, &actions, &location)?;
        }
        Ok(())
    }

    fn add_other(&mut self, directive: Directive) -> Result<()> {
        match directive {
            Directive::Config(setting) => self.config.apply(&setting)?,
            Directive::SecMarker(marker) => {
                for (phase, rules) in self.phases.iter().enumerate() {
                    self.markers[phase].insert(marker.name.clone(), rules.len());
                }
            }
            Directive::SecDefaultAction(default) => {
                let template = RuleActions::from_actions(&default.actions);
                if template.meta.id.is_some() || template.flow.chain {
                    return Err(Error::parse(
                        "SecDefaultAction must not contain id or chain",
                        default.location.to_string(),
                    ));
                }
                tracing::debug!(phase = %default.phase, "default action updated");
                self.defaults[default.phase.index()] = template;
            }
            Directive::SecRuleRemoveById(ranges) => self.removals.extend(ranges),
            Directive::Include(path) => {
                tracing::trace!(path = %path.display(), "include already expanded");
            }
            Directive::Unknown(name) => {
                tracing::warn!(directive = %name, "unsupported directive skipped");
            }
            Directive::SecRule(_) | Directive::SecAction(_) => {}
        }
        Ok(())
    }

    fn add_rule(
        &mut self,
        variables: Vec<VariableSpec>,
        operator: &OperatorSpec,
        actions: &[Action],
        location: &SourceLocation,
    ) -> Result<()> {
        let mut grouped = RuleActions::from_actions(actions);
        let loc = location.to_string();

        let follower = self.open_chain.is_some();
        let phase = match &self.open_chain {
            Some(head) => {
                if let Some(declared) = grouped.meta.phase.filter(|p| *p != head.phase) {
                    tracing::warn!(location = %loc, declared = %declared, "chain link phase ignored");
                }
                head.phase
            }
            None => grouped.meta.phase.unwrap_or(Phase::RequestBody),
        };

        if follower {
            if grouped.meta.id.is_some() {
                return Err(Error::InvalidRuleId {
                    location: loc,
                    message: "chain followers must not declare an id".to_string(),
                });
            }
            if grouped.disruptive.is_some() {
                return Err(Error::parse("chain followers must not declare a disruptive action", loc));
            }
        } else {
            match grouped.meta.id {
                None => return Err(Error::MissingRuleId { location: loc }),
                Some(0) => {
                    return Err(Error::InvalidRuleId {
                        location: loc,
                        message: "id must be a positive integer".to_string(),
                    })
                }
                Some(id) if !self.ids.insert(id) => return Err(Error::DuplicateRuleId { id }),
                Some(_) => {}
            }
        }

        let defaults = &self.defaults[phase.index()];
        grouped.inherit(defaults);
        if follower {
            grouped.disruptive = None;
            grouped.status = None;
        }
        grouped.setvars.retain(|s| {
            let supported = s.collection == "tx";
            if !supported {
                tracing::warn!(location = %loc, collection = %s.collection, "setvar collection not supported, ignored");
            }
            supported
        });

        let base_dir = location.file.as_deref().and_then(Path::parent);
        let ctx = CompileContext {
            registry: self.registry,
            limits: self.config.limits.regex,
            base_dir,
        };
        let compiled = CompiledRule {
            id: grouped.meta.id,
            phase,
            variables,
            operator: CompiledOperator::compile(operator, &ctx)?,
            transformations: TransformationPipeline::from_names(grouped.transformations.as_slice(), self.registry)?,
            block: defaults.block_target(),
            chain: None,
            location: loc,
            actions: grouped,
        };

        let chained = compiled.actions.flow.chain;
        match self.open_chain.take() {
            Some(mut head) => {
                head.append(compiled);
                if chained {
                    self.open_chain = Some(head);
                } else {
                    self.push(head);
                }
            }
            None if chained => self.open_chain = Some(compiled),
            None => self.push(compiled),
        }
        Ok(())
    }

    fn push(&mut self, rule: CompiledRule) {
        tracing::trace!(rule_id = ?rule.id, phase = %rule.phase, "rule compiled");
        self.phases[rule.phase.index()].push(rule);
    }

    fn close_chain(&mut self) -> Result<()> {
        match self.open_chain.take() {
            Some(head) => Err(Error::IncompleteChain {
                id: head.id.unwrap_or_default(),
            }),
            None => Ok(()),
        }
    }

    fn finish(mut self) -> Result<CompiledRuleset> {
        self.close_chain()?;

        if !self.removals.is_empty() {
            for (rules, markers) in self.phases.iter_mut().zip(self.markers.iter_mut()) {
                let removed: Vec<bool> = rules
                    .iter()
                    .map(|r| {
                        r.id
                            .is_some_and(|id| self.removals.iter().any(|range| range.contains(id)))
                    })
                    .collect();
                for pos in markers.values_mut() {
                    *pos -= removed[..*pos].iter().filter(|r| **r).count();
                }
                let mut flags = removed.into_iter();
                rules.retain(|_| !flags.next().unwrap_or(false));
            }
        }

        self.config.validate()?;
        tracing::debug!(
            rules = self.phases.iter().map(Vec::len).sum::<usize>(),
            engine = self.config.rule_engine.as_str(),
            "ruleset compiled"
        );

        Ok(CompiledRuleset {
            config: self.config,
            phases: self.phases,
            markers: self.markers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RuleEngineMode;

    fn compile(rules: &str) -> Result<CompiledRuleset> {
        CompiledRuleset::from_string(rules)
    }

    #[test]
    fn test_rules_grouped_by_phase() {
        let set = compile(
            r#"
            SecRuleEngine DetectionOnly
            SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny"
            SecRule ARGS "@rx select" "id:2,deny"
            SecAction "id:3,phase:5,pass,nolog"
        "#,
        )
        .unwrap();
        assert_eq!(set.config().rule_engine, RuleEngineMode::DetectionOnly);
        assert_eq!(set.rules(Phase::RequestHeaders).len(), 1);
        assert_eq!(set.rules(Phase::RequestBody).len(), 1);
        assert_eq!(set.rules(Phase::Logging).len(), 1);
        assert!(set.find(3).unwrap().is_unconditional());
        assert_eq!(set.rule_count(), 3);
    }

    #[test]
    fn test_chain_nesting() {
        let set = compile(
            r#"
            SecRule REQUEST_METHOD "@streq POST" "id:10,phase:1,deny,chain"
            SecRule REQUEST_URI "@beginsWith /api" "chain"
            SecRule &ARGS "@gt 0" "setvar:tx.seen=1"
        "#,
        )
        .unwrap();
        let rules = set.rules(Phase::RequestHeaders);
        assert_eq!(rules.len(), 1);
        let links: Vec<_> = rules[0].links().collect();
        assert_eq!(links.len(), 3);
        assert!(links[1..].iter().all(|l| l.id.is_none() && l.phase == Phase::RequestHeaders));
        assert!(links[2].actions.disruptive.is_none());
    }

    #[test]
    fn test_incomplete_chain() {
        let err = compile(r#"SecRule ARGS "@rx a" "id:1,deny,chain""#).unwrap_err();
        assert!(matches!(err, Error::IncompleteChain { id: 1 }));

        let err = compile(
            r#"
            SecRule ARGS "@rx a" "id:1,deny,chain"
            SecMarker END
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::IncompleteChain { id: 1 }));
    }

    #[test]
    fn test_id_rules() {
        assert!(matches!(
            compile(r#"SecRule ARGS "@rx a" "deny""#).unwrap_err(),
            Error::MissingRuleId { .. }
        ));
        assert!(matches!(
            compile(
                r#"
                SecRule ARGS "@rx a" "id:5,deny"
                SecRule ARGS "@rx b" "id:5,phase:1,deny"
            "#
            )
            .unwrap_err(),
            Error::DuplicateRuleId { id: 5 }
        ));
        assert!(matches!(
            compile(
                r#"
                SecRule ARGS "@rx a" "id:6,deny,chain"
                SecRule ARGS "@rx b" "id:7"
            "#
            )
            .unwrap_err(),
            Error::InvalidRuleId { .. }
        ));
        assert!(compile(
            r#"
            SecRule ARGS "@rx a" "id:8,deny,chain"
            SecRule ARGS "@rx b" "block"
        "#
        )
        .is_err());
    }

    #[test]
    fn test_default_action_is_order_sensitive() {
        let set = compile(
            r#"
            SecRule ARGS "@rx a" "id:1,phase:2"
            SecDefaultAction "phase:2,log,auditlog,deny,status:406"
            SecRule ARGS "@rx b" "id:2,phase:2"
            SecRule ARGS "@rx c" "id:3,phase:2,pass"
        "#,
        )
        .unwrap();
        assert_eq!(set.find(1).unwrap().actions.disruptive, Some(DisruptiveAction::Pass));
        let second = set.find(2).unwrap();
        assert_eq!(second.actions.disruptive, Some(DisruptiveAction::Deny));
        assert_eq!(second.actions.status, Some(406));
        assert_eq!(set.find(3).unwrap().actions.status, None);
        assert_eq!(
            set.find(3).unwrap().block,
            Some(BlockTarget {
                action: DisruptiveAction::Deny,
                status: Some(406)
            })
        );
    }

    #[test]
    fn test_markers_and_removal() {
        let set = compile(
            r#"
            SecRule ARGS "@rx a" "id:1,phase:2,pass,skipAfter:END"
            SecRule ARGS "@rx b" "id:2,phase:2,deny"
            SecRule ARGS "@rx c" "id:3,phase:2,deny"
            SecMarker END
            SecRule ARGS "@rx d" "id:4,phase:2,deny"
            SecRuleRemoveById 2-3
        "#,
        )
        .unwrap();
        let rules = set.rules(Phase::RequestBody);
        assert_eq!(rules.len(), 2);
        assert_eq!(set.marker(Phase::RequestBody, "END"), Some(1));
        assert_eq!(set.marker(Phase::RequestHeaders, "END"), Some(0));
        assert_eq!(rules[1].id, Some(4));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        assert!(compile("SecRequestBodyLimit 0").is_err());
        assert!(compile(
            r#"
            SecRequestBodyLimit 1000
            SecRequestBodyNoFilesLimit 2000
        "#
        )
        .is_err());
    }

    #[test]
    fn test_unknown_directive_is_skipped() {
        assert!(compile("SecServerSignature foo").is_ok());
    }
}
