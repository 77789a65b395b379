//! Picker Screener - runs one daily selection and prints the result.
//!
//! Usage: `picker-screener [YYYYMMDD]`; the trade date defaults to today.
//!
//! Exits with 2 on configuration or credential errors and 1 on any other
//! failure.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};

use picker_common::config::Config;
use picker_common::Error as CommonError;
use picker_common::logging::init_logging_with_exclusions;
use picker_screener::data::parse_trade_date;
use picker_screener::{open_store, SelectionPipeline, TushareAdapter};

/// Exit code for configuration and credential errors.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = is_fatal(&e);
            tracing::error!(error = %e, fatal, "Selection run failed");
            eprintln!("Error: {:#}", e);
            if fatal {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Whether the failure came from configuration rather than from the scan.
fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<CommonError>().is_some_and(CommonError::is_fatal))
}

async fn run() -> Result<()> {
    let config = Config::load_with_env().context("Failed to load configuration")?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Picker Screener v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate()
        .map_err(|e| CommonError::Config(e.to_string()))
        .context("Invalid configuration")?;

    let trade_date = trade_date_from_args(std::env::args().nth(1))?;

    let provider = Arc::new(TushareAdapter::from_config(&config)?);
    let store = open_store(&config)?;
    let pipeline = SelectionPipeline::new(provider, store, config.screener.clone())?;

    let outcome = pipeline.run(trade_date).await?;

    println!("{}", outcome.render_table());
    if !outcome.persist.is_complete() {
        tracing::warn!(
            failed = outcome.persist.failures.len(),
            "Some selection records were not persisted"
        );
    }

    Ok(())
}

fn trade_date_from_args(arg: Option<String>) -> Result<NaiveDate> {
    match arg {
        Some(raw) => parse_trade_date(&raw)
            .with_context(|| format!("Invalid trade date '{}', expected YYYYMMDD", raw)),
        None => Ok(Local::now().date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_date_from_args() {
        assert_eq!(
            trade_date_from_args(Some("20240308".into())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
        );
        assert!(trade_date_from_args(Some("2024-03-08".into())).is_err());
        assert!(trade_date_from_args(None).is_ok());
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let invalid = Config::default()
            .validate()
            .map_err(|e| CommonError::Config(e.to_string()))
            .context("Invalid configuration")
            .unwrap_err();
        assert!(is_fatal(&invalid));

        let no_token = TushareAdapter::from_config(&Config::default())
            .map(|_| ())
            .context("Failed to build provider")
            .unwrap_err();
        assert!(is_fatal(&no_token));
    }

    #[test]
    fn test_scan_errors_are_not_fatal() {
        let err = anyhow::anyhow!("connection reset").context("Failed to list securities from tushare");
        assert!(!is_fatal(&err));
        assert!(!is_fatal(&trade_date_from_args(Some("bad".into())).unwrap_err()));
    }
}
