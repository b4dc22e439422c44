//! # CLI Interface
//!
//! Defines the command-line argument structure for `bondline-node` using
//! `clap` derive. Supports three subcommands: `run`, `quote`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bondline_protocol::Fixed;

use crate::logging::LogFormat;

/// Most fractional digits accepted in a decimal `--rate`.
const MAX_RATE_DECIMALS: usize = 18;

/// Bondline curve node.
///
/// Hosts a bonding-curve engine with its reference token and role
/// registry, serves the JSON API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "bondline-node",
    about = "Bondline curve node",
    version,
    propagate_version = true
)]
pub struct BondlineNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Bondline node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Price a bond offline against a fixed rate, without starting a node.
    Quote(QuoteArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (JSON).
    ///
    /// When omitted, the node looks for `config.json` in the data directory
    /// and falls back to built-in defaults.
    #[arg(long, short = 'c', env = "BONDLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory where state snapshots are stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "BONDLINE_DATA_DIR", default_value = "./bondline-data")]
    pub data_dir: PathBuf,

    /// Port for the JSON API.
    #[arg(long, env = "BONDLINE_API_PORT", default_value_t = 9851)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "BONDLINE_METRICS_PORT", default_value_t = 9852)]
    pub metrics_port: u16,

    /// Seconds between periodic state snapshots.
    #[arg(long, env = "BONDLINE_SNAPSHOT_SECS", default_value_t = 60)]
    pub snapshot_interval_secs: u64,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "BONDLINE_LOG_FORMAT", default_value = "pretty", value_parser = parse_log_format)]
    pub log_format: LogFormat,
}

/// Arguments for the `quote` subcommand.
#[derive(Parser, Debug)]
pub struct QuoteArgs {
    /// Path to a configuration file (JSON) supplying curve constants.
    #[arg(long, short = 'c', env = "BONDLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bond value in the native currency's smallest unit.
    #[arg(long)]
    pub value: u128,

    /// Reference rate: local currency per whole native unit, as a decimal
    /// such as `1800.25`.
    #[arg(long, value_parser = parse_rate)]
    pub rate: Fixed,

    /// Normalized curve supply to quote from, in whole units.
    #[arg(long, default_value_t = 0)]
    pub supply: u64,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    Ok(LogFormat::from_str_lossy(s))
}

/// Parses a positive decimal such as `2000`, `1800.25` or `0.5` into a
/// [`Fixed`], truncating below 2^-64.
fn parse_rate(s: &str) -> Result<Fixed, String> {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err("rate is empty".into());
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(format!("rate {s:?} is not a decimal number"));
    }
    if frac_part.len() > MAX_RATE_DECIMALS {
        return Err(format!("rate has more than {MAX_RATE_DECIMALS} decimals"));
    }

    let digits: u128 = format!("{int_part}{frac_part}")
        .parse()
        .map_err(|_| format!("rate {s:?} is out of range"))?;
    let rate = Fixed::from_scaled(digits, frac_part.len() as u32)
        .map_err(|e| format!("rate {s:?}: {e}"))?;
    if rate <= Fixed::ZERO {
        return Err("rate must be positive".into());
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        BondlineNodeCli::command().debug_assert();
    }

    #[test]
    fn quote_args_parse() {
        let cli = BondlineNodeCli::parse_from([
            "bondline-node",
            "quote",
            "--value",
            "1000000000000000000",
            "--rate",
            "2000",
        ]);
        match cli.command {
            Commands::Quote(args) => {
                assert_eq!(args.value, 1_000_000_000_000_000_000);
                assert_eq!(args.rate, Fixed::from_int(2_000).unwrap());
                assert_eq!(args.supply, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn decimal_rate_parses() {
        assert_eq!(
            parse_rate("1800.25").unwrap(),
            Fixed::from_scaled(180_025, 2).unwrap()
        );
        assert_eq!(parse_rate("0.5").unwrap(), Fixed::from_ratio(1, 2).unwrap());
        assert_eq!(parse_rate("7.").unwrap(), Fixed::from_int(7).unwrap());
        assert_eq!(parse_rate(".25").unwrap(), Fixed::from_ratio(1, 4).unwrap());

        let cli = BondlineNodeCli::parse_from([
            "bondline-node",
            "quote",
            "--value",
            "1",
            "--rate",
            "1999.999",
        ]);
        match cli.command {
            Commands::Quote(args) => {
                assert_eq!(args.rate, Fixed::from_scaled(1_999_999, 3).unwrap());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bad_rates_rejected() {
        for bad in ["", ".", "0", "0.000", "-1", "1e3", "1.2.3", "abc"] {
            assert!(parse_rate(bad).is_err(), "{bad:?} accepted");
        }
        assert!(parse_rate("1.0000000000000000001").is_err());
        let parsed = BondlineNodeCli::try_parse_from([
            "bondline-node",
            "quote",
            "--value",
            "1",
            "--rate",
            "x",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn run_defaults() {
        let cli = BondlineNodeCli::parse_from(["bondline-node", "run", "--log-format", "json"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.api_port, 9851);
                assert_eq!(args.log_format, LogFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
