//! Transaction processing.
//!
//! A [`Transaction`] is driven by the host through the five phases in
//! order. Each `process_*` call runs the rules of one phase; data setters
//! for a phase must be called before that phase runs. Skipping forward is
//! allowed, going back is an [`Error::PhaseOrder`].

use super::chain::evaluate_chain;
use super::config::{BodyLimitAction, RuleEngineMode};
use super::intervention::{Disposition, Intervention};
use super::matched::{MatchedRule, RuleOutcome};
use super::phase::Phase;
use super::ruleset::CompiledRule;
use super::Shared;
use crate::actions::{apply_setvar, resolve, TxOverrides};
use crate::audit::{AuditInput, AuditRecord};
use crate::body::{process_request_body, BodyBuffer, BodyProcessorKind};
use crate::error::{Error, Result};
use crate::guard::LimitGuard;
use crate::operators::{EvalContext, MacroExpander};
use crate::parser::AllowScope;
use crate::variables::{Value, VariableStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Status answered when the request body breaches its limit.
pub const REQUEST_BODY_LIMIT_STATUS: u16 = 413;

/// Status answered when the response body breaches its limit.
pub const RESPONSE_BODY_LIMIT_STATUS: u16 = 500;

/// One HTTP exchange under inspection. Owned by a single worker.
pub struct Transaction {
    shared: Arc<Shared>,
    store: VariableStore,
    completed: Option<Phase>,
    disposition: Disposition,
    intervention: Option<Intervention>,
    matched: Vec<MatchedRule>,
    overrides: TxOverrides,
    request_body: Option<BodyBuffer>,
    response_body: Option<BodyBuffer>,
    request_body_text: Option<String>,
    response_body_text: Option<String>,
    audit_record: Option<AuditRecord>,
    started: Instant,
}

impl Transaction {
    pub(super) fn new(shared: Arc<Shared>, unique_id: String) -> Self {
        tracing::debug!(tx_id = %unique_id, "transaction started");
        Self {
            shared,
            store: VariableStore::new(unique_id),
            completed: None,
            disposition: Disposition::Pass,
            intervention: None,
            matched: Vec::new(),
            overrides: TxOverrides::default(),
            request_body: None,
            response_body: None,
            request_body_text: None,
            response_body_text: None,
            audit_record: None,
            started: Instant::now(),
        }
    }

    /// Connection endpoints. Must precede phase 1.
    pub fn process_connection(
        &mut self,
        client_ip: &str,
        client_port: u16,
        server_ip: &str,
        server_port: u16,
    ) -> Result<()> {
        self.ensure_before(Phase::RequestHeaders)?;
        let request = self.store.request_mut();
        request.client_ip = client_ip.to_string();
        request.client_port = client_port;
        request.server_ip = server_ip.to_string();
        request.server_port = server_port;
        Ok(())
    }

    /// Request line. Must precede phase 1.
    pub fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) -> Result<()> {
        self.ensure_before(Phase::RequestHeaders)?;
        let separator = self.shared.ruleset.config().argument_separator;
        self.store
            .request_mut()
            .set_request_line(uri, method, protocol, separator);
        Ok(())
    }

    /// Add a request header. Must precede phase 1.
    pub fn add_request_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.ensure_before(Phase::RequestHeaders)?;
        let cookies = self.shared.ruleset.config().cookie_format;
        self.store.request_mut().add_header(name, value, cookies);
        Ok(())
    }

    /// Phase 1.
    pub fn process_request_headers(&mut self) -> Result<()> {
        self.enter(Phase::RequestHeaders)?;
        self.run_phase(Phase::RequestHeaders);
        Ok(())
    }

    /// Buffer a request body chunk. Ignored unless body access is on.
    pub fn append_request_body(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_before(Phase::RequestBody)?;
        let config = self.shared.ruleset.config();
        if !self
            .overrides
            .request_body_access
            .unwrap_or(config.request_body_access)
        {
            return Ok(());
        }
        let buffer = self.request_body.get_or_insert_with(|| {
            BodyBuffer::new(
                config.limits.request_body,
                config.limits.request_body_in_memory,
                config.tmp_dir.as_deref(),
                self.store.unique_id(),
            )
        });
        buffer.append(data);
        Ok(())
    }

    /// Phase 2. Processes the buffered body, then runs the rules.
    pub fn process_request_body(&mut self) -> Result<()> {
        self.enter(Phase::RequestBody)?;
        if !self.phase_active(Phase::RequestBody) {
            return Ok(());
        }
        if let Some(disposition) = self.load_request_body() {
            self.intervene(disposition, Phase::RequestBody, None, None);
            return Ok(());
        }
        self.run_phase(Phase::RequestBody);
        Ok(())
    }

    /// Response status line. Must precede phase 3.
    pub fn set_response_status(&mut self, status: u16, protocol: &str) -> Result<()> {
        self.ensure_before(Phase::ResponseHeaders)?;
        self.store.response_mut().set_status(status, protocol);
        Ok(())
    }

    /// Add a response header. Must precede phase 3.
    pub fn add_response_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.ensure_before(Phase::ResponseHeaders)?;
        self.store.response_mut().add_header(name, value);
        Ok(())
    }

    /// Phase 3.
    pub fn process_response_headers(&mut self) -> Result<()> {
        self.enter(Phase::ResponseHeaders)?;
        self.run_phase(Phase::ResponseHeaders);
        Ok(())
    }

    /// Buffer a response body chunk. Ignored unless body access is on.
    pub fn append_response_body(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_before(Phase::ResponseBody)?;
        let config = self.shared.ruleset.config();
        if !config.response_body_access {
            return Ok(());
        }
        let limit = config.limits.response_body;
        let buffer = self.response_body.get_or_insert_with(|| {
            BodyBuffer::new(limit, limit, config.tmp_dir.as_deref(), self.store.unique_id())
        });
        buffer.append(data);
        Ok(())
    }

    /// Phase 4. Inspects the buffered body when its type is configured.
    pub fn process_response_body(&mut self) -> Result<()> {
        self.enter(Phase::ResponseBody)?;
        if !self.phase_active(Phase::ResponseBody) {
            return Ok(());
        }
        if let Some(disposition) = self.load_response_body() {
            self.intervene(disposition, Phase::ResponseBody, None, None);
            return Ok(());
        }
        self.run_phase(Phase::ResponseBody);
        Ok(())
    }

    /// Phase 5. Runs the logging rules and the Audit Logger. The
    /// disposition is final after phase 4.
    pub fn process_logging(&mut self) -> Result<()> {
        self.enter(Phase::Logging)?;
        self.run_phase(Phase::Logging);
        self.write_audit();
        tracing::debug!(
            tx_id = %self.store.unique_id(),
            disposition = %self.disposition,
            matches = self.matched.len(),
            "transaction finished"
        );
        Ok(())
    }

    /// Drop all state without running phase 5 and delete spill files now.
    pub fn abort(mut self) -> Result<()> {
        tracing::debug!(tx_id = %self.store.unique_id(), "transaction aborted");
        if let Some(buffer) = self.request_body.take() {
            buffer.discard()?;
        }
        if let Some(buffer) = self.response_body.take() {
            buffer.discard()?;
        }
        Ok(())
    }

    /// Current disposition.
    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    /// The terminal decision, if one was made.
    pub fn intervention(&self) -> Option<&Intervention> {
        self.intervention.as_ref()
    }

    /// Rules that matched so far, in order.
    pub fn matched_rules(&self) -> &[MatchedRule] {
        &self.matched
    }

    /// The Variable Store.
    pub fn variables(&self) -> &VariableStore {
        &self.store
    }

    /// Read a variable by selector.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.store.get(name)
    }

    /// Write a TX variable.
    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<()> {
        self.store.set(name, value)
    }

    /// The audit record written at phase 5, if any.
    pub fn audit_record(&self) -> Option<&AuditRecord> {
        self.audit_record.as_ref()
    }

    /// Transaction unique id.
    pub fn unique_id(&self) -> &str {
        self.store.unique_id()
    }

    /// Last phase entered.
    pub fn phase(&self) -> Option<Phase> {
        self.completed
    }

    /// Path of the request body spill file, while one exists.
    pub fn request_body_spill_path(&self) -> Option<&Path> {
        self.request_body.as_ref().and_then(BodyBuffer::spill_path)
    }

    /// Effective rule engine mode, after `ctl:ruleEngine`.
    pub fn engine_mode(&self) -> RuleEngineMode {
        self.overrides
            .rule_engine
            .unwrap_or(self.shared.ruleset.config().rule_engine)
    }

    fn ensure_before(&self, phase: Phase) -> Result<()> {
        match self.completed {
            Some(current) if current >= phase => Err(Error::PhaseOrder {
                requested: phase.name(),
                current: current.name(),
            }),
            _ => Ok(()),
        }
    }

    fn enter(&mut self, phase: Phase) -> Result<()> {
        self.ensure_before(phase)?;
        self.completed = Some(phase);
        self.store.set_phase(phase);
        // allow:phase only covers the phase that raised it.
        if self.disposition == Disposition::Allow(AllowScope::Phase) {
            self.disposition = Disposition::Pass;
        }
        Ok(())
    }

    fn phase_active(&self, phase: Phase) -> bool {
        if self.engine_mode() == RuleEngineMode::Off {
            return false;
        }
        if phase == Phase::Logging {
            return true;
        }
        match self.disposition {
            ref d if d.is_terminal() => false,
            Disposition::Allow(AllowScope::Transaction) => false,
            Disposition::Allow(AllowScope::Request) => !phase.is_request_phase(),
            _ => true,
        }
    }

    fn run_phase(&mut self, phase: Phase) {
        if !self.phase_active(phase) {
            tracing::trace!(tx_id = %self.store.unique_id(), phase = %phase, "phase skipped");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let rules = shared.ruleset.rules(phase);
        let mut idx = 0;
        while idx < rules.len() {
            if self.engine_mode() == RuleEngineMode::Off {
                break;
            }
            let rule = &rules[idx];
            if self.overrides.is_removed(rule.id) {
                idx += 1;
                continue;
            }

            match self.evaluate_rule(rule, phase) {
                RuleOutcome::Continue => idx += 1,
                RuleOutcome::Skip(n) => idx += 1 + n as usize,
                RuleOutcome::SkipAfter(marker) => match shared.ruleset.marker(phase, &marker) {
                    Some(pos) if pos > idx => idx = pos,
                    _ => {
                        tracing::debug!(rule_id = ?rule.id, %marker, "marker not ahead in phase, skipping rest of phase");
                        break;
                    }
                },
                RuleOutcome::StopPhase(disposition) => {
                    if disposition.is_terminal() {
                        let message = self.matched.last().and_then(|m| m.message.clone());
                        self.intervene(disposition, phase, rule.id, message);
                    } else {
                        self.disposition = disposition;
                    }
                    break;
                }
            }
        }
    }

    fn evaluate_rule(&mut self, rule: &CompiledRule, phase: Phase) -> RuleOutcome {
        if !evaluate_chain(rule, |link| self.match_link(link)) {
            return RuleOutcome::Continue;
        }

        let record = self.matched_rule(rule, phase);
        if record.log {
            tracing::info!(tx_id = %self.store.unique_id(), phase = %phase, "{}", record.format_log());
        }
        self.matched.push(record);

        let disposition = match &rule.actions.disruptive {
            Some(action) => resolve(action, rule.actions.status, rule.block.as_ref(), &self.store),
            None => Disposition::Pass,
        };
        if disposition == Disposition::Pass {
            return rule.actions.flow.outcome();
        }
        if phase == Phase::Logging {
            tracing::debug!(rule_id = ?rule.id, %disposition, "disposition ignored in logging phase");
            return rule.actions.flow.outcome();
        }
        if self.engine_mode() == RuleEngineMode::DetectionOnly {
            tracing::info!(rule_id = ?rule.id, %disposition, "detection only, disposition not enforced");
            return rule.actions.flow.outcome();
        }
        RuleOutcome::StopPhase(disposition)
    }

    fn match_link(&mut self, rule: &CompiledRule) -> bool {
        self.store.begin_rule();

        let values: Vec<(String, String)> = if rule.is_unconditional() {
            vec![(String::new(), String::new())]
        } else {
            let mut values = Vec::new();
            for spec in &rule.variables {
                values.extend(self.store.resolve(spec).iter().cloned());
            }
            values
        };
        if values.is_empty() {
            tracing::trace!(rule_id = ?rule.id, "no values to inspect");
            return false;
        }

        let guard = LimitGuard::new(self.shared.ruleset.config().limits.regex);
        let mut captures = None;
        for (name, value) in &values {
            let input = rule.transformations.apply(value);
            let result = rule.operator.evaluate(
                &input,
                &EvalContext {
                    guard: &guard,
                    macros: &self.store,
                },
            );
            if let Some(limit) = result.limit_exceeded {
                tracing::warn!(
                    tx_id = %self.store.unique_id(),
                    rule_id = ?rule.id,
                    variable = %name,
                    %limit,
                    "regex limit exceeded, treated as no match"
                );
                self.store.flag_limits_exceeded();
            }
            if result.matched {
                self.store.record_match(name, &input);
                if captures.is_none() {
                    captures = Some(result.captures);
                }
            }
        }

        let Some(captures) = captures else {
            return false;
        };
        if rule.actions.capture {
            self.store.set_captures(&captures);
        }
        for setvar in &rule.actions.setvars {
            apply_setvar(&mut self.store, setvar);
        }
        for ctl in &rule.actions.controls {
            self.overrides.apply(ctl);
        }
        true
    }

    fn matched_rule(&mut self, rule: &CompiledRule, phase: Phase) -> MatchedRule {
        let meta = &rule.actions.meta;
        if let Some(severity) = meta.severity {
            self.store.note_severity(severity);
        }
        let (var_name, var_value) = self
            .store
            .matched_var()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .unwrap_or_default();
        let expand = |template: &Option<String>| {
            template
                .as_deref()
                .map(|t| self.store.expand(t).into_owned())
        };

        MatchedRule {
            id: rule.id.unwrap_or_default(),
            phase,
            var_name,
            var_value,
            message: expand(&meta.msg),
            logdata: expand(&meta.logdata),
            severity: meta.severity,
            tags: meta.tags.clone(),
            rev: meta.rev.clone(),
            ver: meta.ver.clone(),
            maturity: meta.maturity,
            accuracy: meta.accuracy,
            log: rule.actions.logs(),
            audit_log: rule.actions.audit_logs(),
        }
    }

    fn intervene(
        &mut self,
        disposition: Disposition,
        phase: Phase,
        rule_id: Option<u64>,
        message: Option<String>,
    ) {
        let intervention = Intervention {
            disposition: disposition.clone(),
            phase,
            rule_id,
            message,
        };
        tracing::info!(tx_id = %self.store.unique_id(), "{}", intervention.format_log());
        self.disposition = disposition;
        self.intervention = Some(intervention);
    }

    /// Run the body processor over the buffered request body. Returns the
    /// disposition to apply when the body breaches its limit under `Reject`.
    fn load_request_body(&mut self) -> Option<Disposition> {
        let shared = Arc::clone(&self.shared);
        let config = shared.ruleset.config();
        if !self
            .overrides
            .request_body_access
            .unwrap_or(config.request_body_access)
        {
            return None;
        }
        let limits = &config.limits;
        let reject = config.request_body_limit_action == BodyLimitAction::Reject
            && self.engine_mode() == RuleEngineMode::On;

        let declared = self.store.request().content_length().unwrap_or(0);
        let mut breach = declared > limits.request_body
            || self
                .request_body
                .as_ref()
                .is_some_and(|b| b.exceeded() || b.truncated());
        if breach && reject {
            return self.body_limit_breach(declared, limits.request_body);
        }

        let bytes = match self.request_body.as_mut().map(BodyBuffer::read_all) {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                tracing::error!(tx_id = %self.store.unique_id(), error = %e, "cannot read back request body");
                breach = true;
                Vec::new()
            }
            None => Vec::new(),
        };

        let content_type = self
            .store
            .request()
            .header("content-type")
            .unwrap_or_default()
            .to_string();
        let kind = self
            .overrides
            .request_body_processor
            .or_else(|| BodyProcessorKind::from_content_type(&content_type));
        let processed = process_request_body(
            kind,
            &content_type,
            &bytes,
            config.argument_separator,
            limits.upload_files,
        );

        let without_files = (bytes.len() as u64).saturating_sub(processed.files_size());
        if without_files > limits.request_body_no_files {
            breach = true;
        }

        self.request_body_text = Some(String::from_utf8_lossy(&bytes).into_owned());
        self.store.set_request_body(processed, bytes.len() as u64);

        if breach {
            if reject {
                return self.body_limit_breach(without_files, limits.request_body_no_files);
            }
            self.store.set_inbound_data_error();
            tracing::warn!(tx_id = %self.store.unique_id(), "request body limit exceeded, processing partial body");
        }
        None
    }

    fn body_limit_breach(&mut self, size: u64, limit: u64) -> Option<Disposition> {
        self.store.set_inbound_data_error();
        tracing::warn!(
            tx_id = %self.store.unique_id(),
            size,
            limit,
            "request body limit exceeded, rejecting"
        );
        Some(Disposition::Deny {
            status: REQUEST_BODY_LIMIT_STATUS,
            drop: false,
        })
    }

    fn load_response_body(&mut self) -> Option<Disposition> {
        let shared = Arc::clone(&self.shared);
        let config = shared.ruleset.config();
        if !config.response_body_access {
            return None;
        }
        let inspected = self
            .store
            .response()
            .content_type()
            .is_some_and(|ct| config.inspects_response_type(ct));
        if !inspected {
            tracing::trace!(tx_id = %self.store.unique_id(), "response body type not inspected");
            return None;
        }
        let buffer = self.response_body.as_mut()?;

        if buffer.exceeded() {
            self.store.set_outbound_data_error();
            if config.response_body_limit_action == BodyLimitAction::Reject
                && self.engine_mode() == RuleEngineMode::On
            {
                tracing::warn!(tx_id = %self.store.unique_id(), "response body limit exceeded, rejecting");
                return Some(Disposition::Deny {
                    status: RESPONSE_BODY_LIMIT_STATUS,
                    drop: false,
                });
            }
            tracing::warn!(tx_id = %self.store.unique_id(), "response body limit exceeded, inspecting partial body");
        }

        let buffer = self.response_body.as_mut()?;
        match buffer.read_all() {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.response_body_text = Some(text.clone());
                self.store.set_response_body(text);
            }
            Err(e) => {
                tracing::error!(tx_id = %self.store.unique_id(), error = %e, "cannot read back response body");
            }
        }
        None
    }

    fn write_audit(&mut self) {
        let shared = Arc::clone(&self.shared);
        let audit = &shared.audit;
        let mode = self
            .overrides
            .audit_engine
            .unwrap_or(audit.config().engine);
        let status = self
            .intervention
            .as_ref()
            .map_or(self.store.response().status, Intervention::status);
        let relevant = self.matched.iter().any(|m| m.audit_log);
        if !audit.should_log(mode, status, relevant) {
            return;
        }

        let record = AuditRecord::build(
            &audit.config().parts,
            &AuditInput {
                store: &self.store,
                matched: &self.matched,
                intervention: self.intervention.as_ref(),
                disposition: &self.disposition,
                request_body: self.request_body_text.as_deref(),
                response_body: self.response_body_text.as_deref(),
                engine_mode: self.engine_mode(),
                elapsed: self.started.elapsed(),
            },
        );
        audit.write(&record);
        self.audit_record = Some(record);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.store.unique_id())
            .field("phase", &self.completed)
            .field("disposition", &self.disposition)
            .field("matched", &self.matched.len())
            .finish()
    }
}
