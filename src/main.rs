//! modbridge - run one media module query from the command line
//!
//! Prints the terminal outcome as JSON on stdout and exits non-zero when
//! the query ends in an error.

use module_bridge::core::{self, config::CliArgs};
use module_bridge::{Bridge, BridgeOptions, BridgeOutcome};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration (defaults, config file, env vars, CLI args)
    let config = match core::config::Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting modbridge v{}", module_bridge::VERSION);

    let code = std::fs::read_to_string(&args.module)
        .with_context(|| format!("Failed to read module {}", args.module.display()))?;

    let mut options = BridgeOptions::from_config(args.action.clone(), &config);
    for raw in &args.switches {
        let (key, value) = parse_switch(raw)?;
        options = options.with_switch_value(key, value);
    }

    let bridge = Bridge::new(options)?;
    info!(
        session = %bridge.session_id(),
        action = %bridge.action(),
        version = %bridge.format_version(),
        module = ?args.module,
        "Running query"
    );

    let outcome = tokio::time::timeout(
        config.bridge.query_timeout(),
        bridge.run_query(code, args.query.clone()),
    )
    .await
    .with_context(|| format!("Query timed out after {}s", config.bridge.query_timeout))??;

    if let Err(e) = bridge.destroy().await {
        debug!("Runtime already released: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let BridgeOutcome::Error(e) = &outcome {
        anyhow::bail!("{}: {}", e.error_type, e.message);
    }

    Ok(())
}

/// Parse `key=value`; the value is JSON when it parses, a string otherwise
fn parse_switch(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Switch must be key=value: {}", raw))?;
    if key.is_empty() {
        anyhow::bail!("Switch key cannot be empty: {}", raw);
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("dub=true").unwrap(), ("dub".to_string(), Value::Bool(true)));
        assert_eq!(
            parse_switch("server=vidstream").unwrap(),
            ("server".to_string(), Value::String("vidstream".to_string()))
        );
        assert!(parse_switch("novalue").is_err());
        assert!(parse_switch("=1").is_err());
    }
}
