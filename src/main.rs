//! zentinel-waf CLI tool.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use zentinel_waf::{debuglog, CompiledRuleset, Engine, Phase, Registry, Result, Transaction};

#[derive(Parser)]
#[command(name = "zentinel-waf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a configuration parses and validates
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Run one request/response through all phases
    Test {
        /// Path to the configuration file
        #[arg(short, long)]
        rules: PathBuf,

        /// Request URI
        #[arg(short, long)]
        uri: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request headers (format: "Name: Value")
        #[arg(short = 'H', long)]
        header: Vec<String>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Client address
        #[arg(long, default_value = "127.0.0.1")]
        client_ip: String,

        /// Response status
        #[arg(long, default_value_t = 200)]
        status: u16,

        /// Response headers (format: "Name: Value")
        #[arg(long = "response-header")]
        response_header: Vec<String>,

        /// Response body
        #[arg(long)]
        response_body: Option<String>,
    },

    /// Print compiled rules per phase
    Dump {
        /// Path to the configuration file
        #[arg(short, long)]
        rules: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rules = match &cli.command {
        Commands::Check { rules } | Commands::Test { rules, .. } | Commands::Dump { rules } => {
            rules.clone()
        }
    };

    // Loading logs go to stderr; afterwards SecDebugLog takes over if set.
    let ruleset = tracing::subscriber::with_default(stderr_subscriber(cli.verbose), || {
        info!("Loading configuration from {:?}", rules);
        CompiledRuleset::from_file(&rules, &Registry::default())
    })?;
    if !debuglog::install(ruleset.config())? {
        let _ = tracing::subscriber::set_global_default(stderr_subscriber(cli.verbose));
    }
    let engine = Engine::new(ruleset);

    match cli.command {
        Commands::Check { rules } => check(&engine, &rules),
        Commands::Test {
            uri,
            method,
            header,
            body,
            client_ip,
            status,
            response_header,
            response_body,
            ..
        } => {
            let request = Exchange {
                uri: &uri,
                method: &method,
                headers: &header,
                body: body.as_deref(),
                client_ip: &client_ip,
                status,
                response_headers: &response_header,
                response_body: response_body.as_deref(),
            };
            run_exchange(&engine, &request)
        }
        Commands::Dump { .. } => {
            dump(&engine);
            Ok(())
        }
    }
}

fn stderr_subscriber(verbose: u8) -> impl tracing::Subscriber + Send + Sync {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

fn check(engine: &Engine, path: &Path) -> Result<()> {
    let config = engine.ruleset().config();
    println!("{}: OK", path.display());
    println!("  Rules: {}", engine.rule_count());
    println!("  Rule engine: {}", config.rule_engine.as_str());
    println!("  Request body access: {}", on_off(config.request_body_access));
    println!("  Response body access: {}", on_off(config.response_body_access));
    Ok(())
}

struct Exchange<'a> {
    uri: &'a str,
    method: &'a str,
    headers: &'a [String],
    body: Option<&'a str>,
    client_ip: &'a str,
    status: u16,
    response_headers: &'a [String],
    response_body: Option<&'a str>,
}

fn run_exchange(engine: &Engine, exchange: &Exchange<'_>) -> Result<()> {
    let mut tx = engine.new_transaction();

    tx.process_connection(exchange.client_ip, 0, "127.0.0.1", 80)?;
    tx.process_uri(exchange.uri, exchange.method, "HTTP/1.1")?;
    for (name, value) in split_headers(exchange.headers) {
        tx.add_request_header(name, value)?;
    }
    if let Some(body) = exchange.body {
        let has_length = exchange
            .headers
            .iter()
            .any(|h| h.to_ascii_lowercase().starts_with("content-length:"));
        if !has_length {
            tx.add_request_header("Content-Length", &body.len().to_string())?;
        }
    }
    tx.process_request_headers()?;

    if let Some(body) = exchange.body {
        tx.append_request_body(body.as_bytes())?;
    }
    tx.process_request_body()?;

    tx.set_response_status(exchange.status, "HTTP/1.1")?;
    for (name, value) in split_headers(exchange.response_headers) {
        tx.add_response_header(name, value)?;
    }
    tx.process_response_headers()?;

    if let Some(body) = exchange.response_body {
        tx.append_response_body(body.as_bytes())?;
    }
    tx.process_response_body()?;
    tx.process_logging()?;

    report(&tx);
    Ok(())
}

fn split_headers(headers: &[String]) -> impl Iterator<Item = (&str, &str)> + '_ {
    headers
        .iter()
        .filter_map(|h| h.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()))
}

fn report(tx: &Transaction) {
    println!("Transaction {}", tx.unique_id());
    println!("  Disposition: {}", tx.disposition());
    if let Some(intervention) = tx.intervention() {
        println!("  Intervention: {}", intervention.format_log());
    }

    let matched = tx.matched_rules();
    println!("  Matched rules: {}", matched.len());
    for rule in matched {
        println!("    phase {}: {}", rule.phase, rule.format_log());
    }

    if let Some(record) = tx.audit_record() {
        println!("\nAudit record:");
        print!("{}", record.to_native());
    }
}

fn dump(engine: &Engine) {
    let ruleset = engine.ruleset();
    println!("Total rules: {}", ruleset.rule_count());
    println!("\nRules by phase:");

    for phase in Phase::ALL {
        let rules = ruleset.rules(phase);
        if rules.is_empty() {
            continue;
        }
        println!("\n  Phase {} ({}):", phase.number(), phase.name());
        for rule in rules {
            let id = rule.id.map_or_else(|| "no-id".to_string(), |id| id.to_string());
            for (depth, link) in rule.links().enumerate() {
                let indent = if depth == 0 { "    - " } else { "        chain " };
                let variables: Vec<String> = link.variables.iter().map(ToString::to_string).collect();
                let negation = if link.operator.is_negated() { "!" } else { "" };
                print!(
                    "{}{}{} \"{}@{} {}\"",
                    indent,
                    if depth == 0 { format!("Rule {} ", id) } else { String::new() },
                    variables.join("|"),
                    negation,
                    link.operator.name(),
                    link.operator.argument()
                );
                if depth == 0 {
                    if let Some(msg) = &link.actions.meta.msg {
                        print!(" msg='{}'", msg);
                    }
                }
                println!();
            }
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}
