//! Configuration language parser.
//!
//! Handles the directive language used to configure the engine:
//! - SecRule / SecAction: rules
//! - SecMarker: named markers for skipAfter
//! - SecDefaultAction: per-phase action templates
//! - SecRuleRemoveById: rule removal
//! - Sec* settings: engine configuration
//! - Include: file inclusion (glob patterns allowed)
//!
//! ## SecRule Syntax
//!
//! ```text
//! SecRule VARIABLES "OPERATOR" "ACTIONS"
//! ```
//!
//! Where:
//! - VARIABLES: `|`-separated list of variables to inspect
//! - OPERATOR: pattern to match (e.g., @rx, @contains)
//! - ACTIONS: comma-separated list of actions (e.g., id:1,deny,log)

mod action;
mod directive;
mod lexer;
mod operator;
mod variable;

pub(crate) use action::parse_on_off;
pub use action::{
    parse_actions, Action, AllowScope, ControlAction, DataAction, DisruptiveAction, FlowAction,
    LoggingAction, MetadataAction, SetVarSpec, SetVarValue,
};
pub use directive::{
    ConfigDirective, Directive, RuleIdRange, SecAction, SecDefaultAction, SecMarker, SecRule,
};
pub use lexer::{logical_lines, LexError, LogicalLine, Token};
pub use operator::{parse_operator, OperatorName, OperatorSpec};
pub use variable::{
    parse_single_variable, parse_variables, Exclusion, Selection, VariableName, VariableSpec,
};

use crate::audit::{AuditEngineMode, AuditLogFormat, AuditLogType};
use crate::engine::config::{BodyLimitAction, RuleEngineMode};
use crate::error::{Error, Result, SourceLocation};
use std::path::{Path, PathBuf};

/// Nested Include limit.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Parser for configuration files.
pub struct Parser {
    /// Parsed directives.
    directives: Vec<Directive>,
    /// Current source location for error reporting.
    location: SourceLocation,
    /// Current Include nesting.
    include_depth: usize,
}

impl Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
            location: SourceLocation::default(),
            include_depth: 0,
        }
    }

    /// Parse a configuration string.
    pub fn parse(&mut self, input: &str) -> Result<()> {
        self.parse_with_location(input, None)
    }

    /// Parse a configuration string with file location.
    pub fn parse_with_location(&mut self, input: &str, file: Option<&Path>) -> Result<()> {
        let saved = std::mem::replace(
            &mut self.location,
            SourceLocation {
                file: file.map(Path::to_path_buf),
                line: 1,
            },
        );

        let lines = logical_lines(input).map_err(|e| {
            self.location.line = e.line;
            Error::parse(e.message, self.location.to_string())
        })?;

        for line in lines {
            self.location.line = line.line;
            let mut tokens = line.tokens.into_iter();
            let Some(name) = tokens.next() else {
                continue;
            };
            let args: Vec<Token> = tokens.collect();
            let directive = self.parse_directive(name.text(), args)?;
            self.directives.push(directive);
        }

        self.location = saved;
        Ok(())
    }

    /// Parse a configuration file.
    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::RuleFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "parsing configuration file");
        self.parse_with_location(&content, Some(path))
    }

    /// Parse files matching a glob pattern.
    pub fn parse_glob(&mut self, pattern: &str) -> Result<()> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::parse(format!("invalid glob pattern: {}", e), pattern))?;

        let mut matched = false;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    matched = true;
                    self.parse_file(&path)?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "error reading glob entry");
                }
            }
        }

        if !matched && !pattern.contains(['*', '?', '[']) {
            return Err(Error::RuleFileLoad {
                path: PathBuf::from(pattern),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        Ok(())
    }

    /// Get the parsed directives.
    pub fn into_directives(self) -> Vec<Directive> {
        self.directives
    }

    /// Get a reference to the parsed directives.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, self.location.to_string())
    }

    /// Attach the current location to location-less parse errors.
    fn locate(&self, err: Error) -> Error {
        match err {
            Error::Parse { message, location } if location.is_empty() => {
                Error::parse(message, self.location.to_string())
            }
            other => other,
        }
    }

    fn parse_directive(&mut self, name: &str, args: Vec<Token>) -> Result<Directive> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "secrule" => self.parse_secrule(args),
            "secaction" => self.parse_secaction(args),
            "secmarker" => {
                let name = self.single_arg(name, args)?;
                Ok(Directive::SecMarker(SecMarker { name }))
            }
            "secdefaultaction" => self.parse_secdefaultaction(args),
            "secruleremovebyid" => self.parse_secruleremovebyid(args),
            "include" => self.parse_include(args),
            _ => match self.parse_config(&lower, name, args)? {
                Some(config) => Ok(Directive::Config(config)),
                None => {
                    tracing::warn!(
                        directive = name,
                        location = %self.location,
                        "unknown directive, skipping"
                    );
                    Ok(Directive::Unknown(name.to_string()))
                }
            },
        }
    }

    fn parse_secrule(&mut self, args: Vec<Token>) -> Result<Directive> {
        let mut args = args.into_iter();
        let (Some(variables), Some(operator)) = (args.next(), args.next()) else {
            return Err(self.error("SecRule requires variables and an operator"));
        };
        let actions = args.next();
        if args.next().is_some() {
            return Err(self.error("SecRule takes at most three arguments"));
        }

        let variables = parse_variables(variables.text()).map_err(|e| self.locate(e))?;
        let operator = parse_operator(operator.text()).map_err(|e| self.locate(e))?;
        let actions = match actions {
            Some(a) => parse_actions(a.text()).map_err(|e| self.locate(e))?,
            None => Vec::new(),
        };

        Ok(Directive::SecRule(SecRule {
            variables,
            operator,
            actions,
            location: self.location.clone(),
        }))
    }

    fn parse_secaction(&mut self, args: Vec<Token>) -> Result<Directive> {
        let text = self.single_arg("SecAction", args)?;
        let actions = parse_actions(&text).map_err(|e| self.locate(e))?;
        Ok(Directive::SecAction(SecAction {
            actions,
            location: self.location.clone(),
        }))
    }

    fn parse_secdefaultaction(&mut self, args: Vec<Token>) -> Result<Directive> {
        let text = self.single_arg("SecDefaultAction", args)?;
        let actions = parse_actions(&text).map_err(|e| self.locate(e))?;

        let phase = actions
            .iter()
            .find_map(|a| match a {
                Action::Metadata(MetadataAction::Phase(p)) => Some(*p),
                _ => None,
            })
            .ok_or_else(|| {
                Error::config(format!("SecDefaultAction at {} must specify a phase", self.location))
            })?;

        Ok(Directive::SecDefaultAction(SecDefaultAction {
            phase,
            actions,
            location: self.location.clone(),
        }))
    }

    fn parse_secruleremovebyid(&mut self, args: Vec<Token>) -> Result<Directive> {
        if args.is_empty() {
            return Err(self.error("SecRuleRemoveById requires at least one id"));
        }

        let mut ranges = Vec::new();
        for token in args {
            for item in token.text().split_whitespace() {
                let parsed = match item.split_once('-') {
                    Some((start, end)) => start.parse().ok().zip(end.parse().ok()),
                    None => item.parse().ok().map(|id| (id, id)),
                };
                let (start, end) = parsed
                    .filter(|(s, e)| s <= e)
                    .ok_or_else(|| self.error(format!("invalid rule id or range '{}'", item)))?;
                ranges.push(RuleIdRange { start, end });
            }
        }

        Ok(Directive::SecRuleRemoveById(ranges))
    }

    fn parse_include(&mut self, args: Vec<Token>) -> Result<Directive> {
        let path = self.single_arg("Include", args)?;

        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(self.error(format!("Include nesting deeper than {}", MAX_INCLUDE_DEPTH)));
        }

        let resolved = match self.location.file.as_ref().and_then(|f| f.parent()) {
            Some(parent) if Path::new(&path).is_relative() => {
                parent.join(&path).to_string_lossy().into_owned()
            }
            _ => path,
        };

        self.include_depth += 1;
        let result = self.parse_glob(&resolved);
        self.include_depth -= 1;
        result?;

        Ok(Directive::Include(resolved.into()))
    }

    /// Parse an engine setting. Returns `None` for unknown directive names.
    fn parse_config(
        &self,
        lower: &str,
        name: &str,
        args: Vec<Token>,
    ) -> Result<Option<ConfigDirective>> {
        let config = match lower {
            "secruleengine" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::RuleEngine(self.keyword(name, &v, RuleEngineMode::parse(&v))?)
            }
            "secrequestbodyaccess" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::RequestBodyAccess(self.keyword(name, &v, parse_on_off(&v))?)
            }
            "secresponsebodyaccess" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::ResponseBodyAccess(self.keyword(name, &v, parse_on_off(&v))?)
            }
            "secrequestbodylimit" => ConfigDirective::RequestBodyLimit(self.number(name, args)?),
            "secrequestbodynofileslimit" => {
                ConfigDirective::RequestBodyNoFilesLimit(self.number(name, args)?)
            }
            "secrequestbodyinmemorylimit" => {
                ConfigDirective::RequestBodyInMemoryLimit(self.number(name, args)?)
            }
            "secresponsebodylimit" => ConfigDirective::ResponseBodyLimit(self.number(name, args)?),
            "secrequestbodylimitaction" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::RequestBodyLimitAction(
                    self.keyword(name, &v, BodyLimitAction::parse(&v))?,
                )
            }
            "secresponsebodylimitaction" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::ResponseBodyLimitAction(
                    self.keyword(name, &v, BodyLimitAction::parse(&v))?,
                )
            }
            "secresponsebodymimetype" => {
                let types: Vec<String> = args
                    .iter()
                    .flat_map(|t| t.text().split_whitespace())
                    .map(str::to_ascii_lowercase)
                    .collect();
                if types.is_empty() {
                    return Err(self.error(format!("{} requires at least one type", name)));
                }
                ConfigDirective::ResponseBodyMimeType(types)
            }
            "secargumentseparator" => {
                ConfigDirective::ArgumentSeparator(self.single_arg(name, args)?)
            }
            "seccookieformat" => ConfigDirective::CookieFormat(self.number(name, args)?),
            "sectmpdir" => ConfigDirective::TmpDir(self.single_arg(name, args)?.into()),
            "secdatadir" => ConfigDirective::DataDir(self.single_arg(name, args)?.into()),
            "secuploadfilelimit" => ConfigDirective::UploadFileLimit(self.number(name, args)?),
            "secdebuglog" => ConfigDirective::DebugLog(self.single_arg(name, args)?.into()),
            "secdebugloglevel" => ConfigDirective::DebugLogLevel(self.number(name, args)?),
            "secauditengine" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::AuditEngine(self.keyword(name, &v, AuditEngineMode::parse(&v))?)
            }
            "secauditlogrelevantstatus" => {
                ConfigDirective::AuditLogRelevantStatus(self.single_arg(name, args)?)
            }
            "secauditlogparts" => ConfigDirective::AuditLogParts(self.single_arg(name, args)?),
            "secauditlogtype" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::AuditLogType(self.keyword(name, &v, AuditLogType::parse(&v))?)
            }
            "secauditlog" => ConfigDirective::AuditLog(self.single_arg(name, args)?.into()),
            "secauditlogstoragedir" => {
                ConfigDirective::AuditLogStorageDir(self.single_arg(name, args)?.into())
            }
            "secauditlogformat" => {
                let v = self.single_arg(name, args)?;
                ConfigDirective::AuditLogFormat(self.keyword(name, &v, AuditLogFormat::parse(&v))?)
            }
            "secpcrematchlimit" => ConfigDirective::PcreMatchLimit(self.number(name, args)?),
            "secpcrematchlimitrecursion" => {
                ConfigDirective::PcreMatchLimitRecursion(self.number(name, args)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(config))
    }

    fn single_arg(&self, name: &str, args: Vec<Token>) -> Result<String> {
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(arg), None) => Ok(arg.into_text()),
            (None, _) => Err(self.error(format!("{} requires an argument", name))),
            (Some(_), Some(_)) => Err(self.error(format!("{} takes exactly one argument", name))),
        }
    }

    fn number<T: std::str::FromStr>(&self, name: &str, args: Vec<Token>) -> Result<T> {
        let value = self.single_arg(name, args)?;
        value.trim().parse().map_err(|_| {
            Error::config(format!(
                "{} at {}: '{}' is not a valid number",
                name, self.location, value
            ))
        })
    }

    fn keyword<T>(&self, name: &str, value: &str, parsed: Option<T>) -> Result<T> {
        parsed.ok_or_else(|| {
            Error::config(format!("{} at {}: invalid value '{}'", name, self.location, value))
        })
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("directives", &self.directives.len())
            .field("location", &self.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rule() {
        let mut parser = Parser::new();
        parser
            .parse(r#"SecRule REQUEST_URI "@contains /admin" "id:1,deny,status:403""#)
            .unwrap();

        assert_eq!(parser.directives().len(), 1);
        match &parser.directives()[0] {
            Directive::SecRule(rule) => {
                assert_eq!(rule.variables.len(), 1);
                assert_eq!(rule.variables[0].name, VariableName::RequestUri);
                assert_eq!(rule.id(), Some(1));
            }
            other => panic!("expected SecRule, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_settings() {
        let mut parser = Parser::new();
        parser
            .parse(
                "SecRuleEngine DetectionOnly\n\
                 SecRequestBodyLimit 16777216\n\
                 SecRequestBodyLimitAction ProcessPartial\n\
                 SecAuditLogParts ABHZ\n\
                 SecResponseBodyMimeType text/plain application/json\n",
            )
            .unwrap();

        let configs: Vec<_> = parser
            .directives()
            .iter()
            .filter_map(|d| match d {
                Directive::Config(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(configs[0], ConfigDirective::RuleEngine(RuleEngineMode::DetectionOnly));
        assert_eq!(configs[1], ConfigDirective::RequestBodyLimit(16_777_216));
        assert_eq!(
            configs[2],
            ConfigDirective::RequestBodyLimitAction(BodyLimitAction::ProcessPartial)
        );
        assert_eq!(configs[3], ConfigDirective::AuditLogParts("ABHZ".to_string()));
        assert_eq!(
            configs[4],
            ConfigDirective::ResponseBodyMimeType(vec![
                "text/plain".to_string(),
                "application/json".to_string()
            ])
        );
    }

    #[test]
    fn test_malformed_limit_is_config_error() {
        let mut parser = Parser::new();
        let err = parser.parse("SecRequestBodyLimit lots").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_default_action_requires_phase() {
        let mut parser = Parser::new();
        let err = parser.parse(r#"SecDefaultAction "log,deny""#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let mut parser = Parser::new();
        parser.parse(r#"SecDefaultAction "phase:2,log,deny""#).unwrap();
    }

    #[test]
    fn test_remove_by_id_ranges() {
        let mut parser = Parser::new();
        parser.parse("SecRuleRemoveById 5 10-20").unwrap();
        match &parser.directives()[0] {
            Directive::SecRuleRemoveById(ranges) => {
                assert_eq!(ranges.len(), 2);
                assert!(ranges[1].contains(15));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_directive_is_skipped() {
        let mut parser = Parser::new();
        parser.parse("SecComponentSignature \"x\"\nSecMarker END").unwrap();
        assert!(matches!(parser.directives()[0], Directive::Unknown(_)));
        assert!(matches!(parser.directives()[1], Directive::SecMarker(_)));
    }

    #[test]
    fn test_error_carries_location() {
        let mut parser = Parser::new();
        let err = parser
            .parse("SecRuleEngine On\nSecRule ARGS \"@rx a\" \"id:1,bogus\"")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAction { .. }));

        let err = parser.parse("\n\nSecRule ARGS").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_include_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rules.conf"),
            r#"SecRule ARGS "@rx x" "id:5,phase:2,deny""#,
        )
        .unwrap();
        let main = dir.path().join("main.conf");
        std::fs::write(&main, "SecRuleEngine On\nInclude rules.conf\n").unwrap();

        let mut parser = Parser::new();
        parser.parse_file(&main).unwrap();
        assert!(parser
            .directives()
            .iter()
            .any(|d| matches!(d, Directive::SecRule(r) if r.id() == Some(5))));
    }

    #[test]
    fn test_missing_include_is_error() {
        let mut parser = Parser::new();
        let err = parser.parse("Include /nonexistent/zentinel/rules.conf").unwrap_err();
        assert!(matches!(err, Error::RuleFileLoad { .. }));
    }
}
