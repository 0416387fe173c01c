//! Action list parsing for SecRule, SecAction and SecDefaultAction.

use crate::audit::AuditEngineMode;
use crate::body::BodyProcessorKind;
use crate::engine::config::RuleEngineMode;
use crate::engine::Phase;
use crate::error::{Error, Result};

/// An action in a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Disruptive action (deny, block, pass, allow, redirect, drop).
    Disruptive(DisruptiveAction),
    /// Flow control action (chain, skip, skipAfter).
    Flow(FlowAction),
    /// Metadata action (id, phase, severity, msg, tag, etc.).
    Metadata(MetadataAction),
    /// Data action (setvar, capture).
    Data(DataAction),
    /// Logging action (log, nolog, auditlog, noauditlog).
    Logging(LoggingAction),
    /// Per-transaction override (ctl).
    Control(ControlAction),
    /// Transformation (t:xxx).
    Transformation(String),
}

/// Disruptive actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisruptiveAction {
    /// Deny with the rule's status (default 403).
    Deny,
    /// Resolve to the phase's default disruptive action.
    Block,
    /// Continue processing.
    Pass,
    /// Stop inspecting.
    Allow(AllowScope),
    /// Redirect to a URL.
    Redirect(String),
    /// Deny and drop the connection.
    Drop,
}

/// How far an `allow` reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowScope {
    /// Skip all remaining phases except logging.
    Transaction,
    /// Skip the rest of the current phase.
    Phase,
    /// Skip the remaining request phases.
    Request,
}

/// Flow control actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Chain to next rule.
    Chain,
    /// Skip N rules.
    Skip(u32),
    /// Skip to marker.
    SkipAfter(String),
}

/// Metadata actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataAction {
    /// Rule ID.
    Id(u64),
    /// Processing phase.
    Phase(Phase),
    /// Severity level (0 emergency .. 7 debug).
    Severity(u8),
    /// Message template.
    Msg(String),
    /// Tag.
    Tag(String),
    /// Revision.
    Rev(String),
    /// Version.
    Ver(String),
    /// Maturity level.
    Maturity(u8),
    /// Accuracy level.
    Accuracy(u8),
    /// Log data template.
    LogData(String),
    /// HTTP status code used by deny.
    Status(u16),
}

/// Data actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAction {
    /// Set a collection variable.
    SetVar(SetVarSpec),
    /// Store regex capture groups in TX:0..9.
    Capture,
}

/// setvar specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVarSpec {
    /// Collection name, lower-cased.
    pub collection: String,
    /// Variable key (may contain macros).
    pub key: String,
    /// Operation.
    pub value: SetVarValue,
}

/// setvar operations. Operands are macro templates expanded at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetVarValue {
    /// `=value`
    Assign(String),
    /// `=+n`
    Add(String),
    /// `=-n`
    Subtract(String),
    /// `!name`
    Delete,
}

/// Logging actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingAction {
    /// Record the match in the debug/error log.
    Log,
    /// Do not log the match.
    NoLog,
    /// Mark the transaction relevant for auditing.
    AuditLog,
    /// Do not mark the transaction relevant.
    NoAuditLog,
}

/// Per-transaction configuration overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// ctl:ruleEngine=
    RuleEngine(RuleEngineMode),
    /// ctl:auditEngine=
    AuditEngine(AuditEngineMode),
    /// ctl:requestBodyAccess=
    RequestBodyAccess(bool),
    /// ctl:requestBodyProcessor=
    RequestBodyProcessor(BodyProcessorKind),
    /// ctl:ruleRemoveById=
    RuleRemoveById(u64),
}

impl Action {
    /// Whether this is a disruptive action.
    pub fn is_disruptive(&self) -> bool {
        matches!(self, Action::Disruptive(_))
    }
}

/// Parse an action list from a string.
pub fn parse_actions(input: &str) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (c, quote) {
            ('\'', None) => {
                quote = Some(c);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            (',', None) => {
                if !current.trim().is_empty() {
                    actions.push(parse_single_action(current.trim())?);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(Error::InvalidActionArgument {
            action: current.trim().to_string(),
            message: "unterminated quote".to_string(),
        });
    }

    if !current.trim().is_empty() {
        actions.push(parse_single_action(current.trim())?);
    }

    Ok(actions)
}

fn invalid(action: &str, message: impl Into<String>) -> Error {
    Error::InvalidActionArgument {
        action: action.to_string(),
        message: message.into(),
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn required<'a>(action: &str, argument: Option<&'a str>) -> Result<&'a str> {
    argument
        .map(unquote)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(action, "missing argument"))
}

fn number<T: std::str::FromStr>(action: &str, argument: Option<&str>) -> Result<T> {
    let arg = required(action, argument)?;
    arg.parse()
        .map_err(|_| invalid(action, format!("'{}' is not a valid number", arg)))
}

/// Parse a single action.
fn parse_single_action(input: &str) -> Result<Action> {
    let (name, argument) = match input.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg)),
        None => (input, None),
    };
    let lower = name.to_ascii_lowercase();

    let action = match lower.as_str() {
        "t" => Action::Transformation(required("t", argument)?.to_string()),

        "deny" => Action::Disruptive(DisruptiveAction::Deny),
        "block" => Action::Disruptive(DisruptiveAction::Block),
        "pass" => Action::Disruptive(DisruptiveAction::Pass),
        "drop" => Action::Disruptive(DisruptiveAction::Drop),
        "allow" => {
            let scope = match argument.map(|a| unquote(a).to_ascii_lowercase()).as_deref() {
                None | Some("") => AllowScope::Transaction,
                Some("phase") => AllowScope::Phase,
                Some("request") => AllowScope::Request,
                Some(other) => return Err(invalid("allow", format!("unknown scope '{}'", other))),
            };
            Action::Disruptive(DisruptiveAction::Allow(scope))
        }
        "redirect" => {
            Action::Disruptive(DisruptiveAction::Redirect(required("redirect", argument)?.to_string()))
        }

        "chain" => Action::Flow(FlowAction::Chain),
        "skip" => {
            let n: u32 = number("skip", argument)?;
            if n == 0 {
                return Err(invalid("skip", "count must be positive"));
            }
            Action::Flow(FlowAction::Skip(n))
        }
        "skipafter" => Action::Flow(FlowAction::SkipAfter(required("skipAfter", argument)?.to_string())),

        "id" => Action::Metadata(MetadataAction::Id(number("id", argument)?)),
        "phase" => {
            let arg = required("phase", argument)?;
            let phase = parse_phase(arg).ok_or_else(|| invalid("phase", format!("invalid phase '{}'", arg)))?;
            Action::Metadata(MetadataAction::Phase(phase))
        }
        "severity" => {
            let arg = required("severity", argument)?;
            let sev = parse_severity(arg)
                .ok_or_else(|| invalid("severity", format!("invalid severity '{}'", arg)))?;
            Action::Metadata(MetadataAction::Severity(sev))
        }
        "msg" => Action::Metadata(MetadataAction::Msg(unquote(argument.unwrap_or_default()).to_string())),
        "logdata" => Action::Metadata(MetadataAction::LogData(unquote(argument.unwrap_or_default()).to_string())),
        "tag" => Action::Metadata(MetadataAction::Tag(unquote(argument.unwrap_or_default()).to_string())),
        "rev" => Action::Metadata(MetadataAction::Rev(unquote(argument.unwrap_or_default()).to_string())),
        "ver" => Action::Metadata(MetadataAction::Ver(unquote(argument.unwrap_or_default()).to_string())),
        "maturity" => Action::Metadata(MetadataAction::Maturity(number("maturity", argument)?)),
        "accuracy" => Action::Metadata(MetadataAction::Accuracy(number("accuracy", argument)?)),
        "status" => {
            let status: u16 = number("status", argument)?;
            if !(100..=599).contains(&status) {
                return Err(invalid("status", format!("{} is not an HTTP status", status)));
            }
            Action::Metadata(MetadataAction::Status(status))
        }

        "setvar" => Action::Data(DataAction::SetVar(parse_setvar(required("setvar", argument)?)?)),
        "capture" => Action::Data(DataAction::Capture),

        "log" => Action::Logging(LoggingAction::Log),
        "nolog" => Action::Logging(LoggingAction::NoLog),
        "auditlog" => Action::Logging(LoggingAction::AuditLog),
        "noauditlog" => Action::Logging(LoggingAction::NoAuditLog),

        "ctl" => Action::Control(parse_ctl(required("ctl", argument)?)?),

        _ => {
            return Err(Error::UnknownAction {
                name: name.to_string(),
            })
        }
    };

    Ok(action)
}

/// Parse a phase argument: a number or `request`/`response`/`logging`.
fn parse_phase(s: &str) -> Option<Phase> {
    match s.to_ascii_lowercase().as_str() {
        "request" => Some(Phase::RequestBody),
        "response" => Some(Phase::ResponseBody),
        "logging" => Some(Phase::Logging),
        n => n.parse().ok().and_then(Phase::from_number),
    }
}

fn parse_ctl(spec: &str) -> Result<ControlAction> {
    let (option, value) = spec
        .split_once('=')
        .ok_or_else(|| invalid("ctl", format!("expected option=value, got '{}'", spec)))?;
    let value = value.trim();

    let ctl = match option.trim().to_ascii_lowercase().as_str() {
        "ruleengine" => ControlAction::RuleEngine(
            RuleEngineMode::parse(value).ok_or_else(|| invalid("ctl:ruleEngine", value))?,
        ),
        "auditengine" => ControlAction::AuditEngine(
            AuditEngineMode::parse(value).ok_or_else(|| invalid("ctl:auditEngine", value))?,
        ),
        "requestbodyaccess" => ControlAction::RequestBodyAccess(
            parse_on_off(value).ok_or_else(|| invalid("ctl:requestBodyAccess", value))?,
        ),
        "requestbodyprocessor" => ControlAction::RequestBodyProcessor(
            BodyProcessorKind::parse(value).ok_or_else(|| invalid("ctl:requestBodyProcessor", value))?,
        ),
        "ruleremovebyid" => ControlAction::RuleRemoveById(
            value
                .parse()
                .map_err(|_| invalid("ctl:ruleRemoveById", value))?,
        ),
        other => {
            return Err(invalid("ctl", format!("unsupported option '{}'", other)));
        }
    };
    Ok(ctl)
}

/// Parse `On`/`Off` (also accepts `true`/`false`).
pub(crate) fn parse_on_off(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        _ => None,
    }
}

/// Parse a setvar specification.
fn parse_setvar(input: &str) -> Result<SetVarSpec> {
    let input = input.trim();

    if let Some(var) = input.strip_prefix('!') {
        let (collection, key) = split_var_name(var)?;
        return Ok(SetVarSpec {
            collection,
            key,
            value: SetVarValue::Delete,
        });
    }

    let (var, value) = match input.split_once('=') {
        Some((var, value)) => (var, Some(value)),
        None => (input, None),
    };

    let (collection, key) = split_var_name(var)?;

    let value = match value {
        None => SetVarValue::Assign("1".to_string()),
        Some(v) => match (v.strip_prefix('+'), v.strip_prefix('-')) {
            (Some(n), _) => SetVarValue::Add(n.to_string()),
            (_, Some(n)) => SetVarValue::Subtract(n.to_string()),
            _ => SetVarValue::Assign(v.to_string()),
        },
    };

    Ok(SetVarSpec {
        collection,
        key,
        value,
    })
}

fn split_var_name(input: &str) -> Result<(String, String)> {
    let (collection, key) = input
        .split_once('.')
        .ok_or_else(|| invalid("setvar", format!("'{}' is not COLLECTION.key", input)))?;
    if key.is_empty() {
        return Err(invalid("setvar", "empty variable key"));
    }
    Ok((collection.trim().to_ascii_lowercase(), key.trim().to_string()))
}

/// Parse severity from a number or a syslog name.
fn parse_severity(s: &str) -> Option<u8> {
    if let Ok(n) = s.parse::<u8>() {
        return (n <= 7).then_some(n);
    }

    match s.to_ascii_lowercase().as_str() {
        "emergency" => Some(0),
        "alert" => Some(1),
        "critical" => Some(2),
        "error" => Some(3),
        "warning" => Some(4),
        "notice" => Some(5),
        "info" => Some(6),
        "debug" => Some(7),
        _ => None,
    }
}
