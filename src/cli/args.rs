//! CLI argument definitions using clap
//!
//! Commands:
//! - sensorgate parse-aggregate <expr>
//! - sensorgate noise --aggregate avg --min 0 --max 40 --epsilon 0.5 --count 12
//! - sensorgate resolve --fixture <path> --owner <o> --stream <s> --user <u>
//! - sensorgate query --fixture <path> [--config <path>]
//! - sensorgate explain --fixture <path> [--config <path>]
//!
//! `query` and `explain` read one JSON query request from stdin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sensorgate - policy-resolving, privacy-preserving sensor queries
#[derive(Parser, Debug)]
#[command(name = "sensorgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse an aggregate expression and print its structure
    ParseAggregate {
        /// Expression, e.g. "NoisyAggregateBy('avg($temp)', '1hour', 0.5)"
        expr: String,
    },

    /// Draw Laplace noise for one aggregate output
    Noise {
        /// Aggregate function name (avg, min, max, median, sum, first, last, nth)
        #[arg(long)]
        aggregate: String,
        /// Lower sensitivity bound
        #[arg(long, allow_hyphen_values = true)]
        min: f64,
        /// Upper sensitivity bound
        #[arg(long, allow_hyphen_values = true)]
        max: f64,
        /// Privacy budget
        #[arg(long)]
        epsilon: f64,
        /// Sample count (avg only)
        #[arg(long)]
        count: Option<u64>,
        /// Number of draws
        #[arg(long, default_value_t = 1)]
        draws: usize,
    },

    /// Resolve one user's access to a stream
    Resolve {
        /// Path to fixture file
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        stream: String,
        #[arg(long)]
        user: String,
    },

    /// Execute a single query request read from stdin
    Query {
        /// Path to fixture file
        #[arg(long)]
        fixture: PathBuf,
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Explain a single query request read from stdin
    Explain {
        /// Path to fixture file
        #[arg(long)]
        fixture: PathBuf,
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_noise_with_negative_bound() {
        let cli = Cli::try_parse_from([
            "sensorgate", "noise", "--aggregate", "sum", "--min", "-5", "--max", "5",
            "--epsilon", "1",
        ])
        .unwrap();
        match cli.command {
            Command::Noise { min, max, draws, count, .. } => {
                assert_eq!((min, max, draws, count), (-5.0, 5.0, 1, None));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_config_optional() {
        let cli = Cli::try_parse_from(["sensorgate", "query", "--fixture", "f.json"]).unwrap();
        assert!(matches!(cli.command, Command::Query { config: None, .. }));
    }
}
