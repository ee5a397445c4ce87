//! Command-line interface for sensorgate
//!
//! - parse-aggregate: parse an aggregate expression
//! - noise: draw calibrated Laplace noise
//! - resolve: resolve access against a fixture
//! - query / explain: run one request against a fixture

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{run_command, Config, Fixture, FixtureInstantiation, FixtureStream};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_error, write_response};

/// Parse arguments and run the command on a fresh runtime
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_command(cli.command))
}
