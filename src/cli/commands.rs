//! CLI command implementations
//!
//! `resolve`, `query` and `explain` run against an in-memory deployment
//! built from a fixture file: streams with their tuples, rules, template
//! instantiations and macros. Nothing is persisted.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::thread_rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::aggregate::parse_aggregate_expr;
use crate::gateway::SensorGate;
use crate::model::{Channel, Macro, Rule};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::planner::{PlannerConfig, PlannerError, QueryRequest};
use crate::policy::TemplateInstantiation;
use crate::privacy::{PrivacyNoiseEngine, SensitivityRange};
use crate::store::{MemoryCatalog, MemoryStore, TimeSeriesStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Lowest severity written to the log (default: "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", &path.display().to_string())],
        );
        Ok(config)
    }

    /// Defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self {
                log_level: default_log_level(),
                ..Default::default()
            }),
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        self.planner
            .validate()
            .map_err(|e| CliError::config_error(format!("Planner config error: {}", e)))?;
        self.log_severity()?;
        Ok(())
    }

    pub fn log_severity(&self) -> CliResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            CliError::config_error(format!("Invalid log_level: '{}'", self.log_level))
        })
    }
}

/// One stream of a fixture, with its initial tuples
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureStream {
    pub owner: String,
    pub name: String,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// JSON tuples, `[timestamp, value, ...]`
    #[serde(default)]
    pub tuples: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureInstantiation {
    pub owner: String,
    #[serde(flatten)]
    pub request: TemplateInstantiation,
}

/// In-memory deployment description
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub streams: Vec<FixtureStream>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub instantiations: Vec<FixtureInstantiation>,
    #[serde(default)]
    pub macros: Vec<Macro>,
}

impl Fixture {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::fixture_error(format!("Failed to read fixture: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| CliError::fixture_error(format!("Invalid fixture JSON: {}", e)))
    }

    /// Registers everything and returns a gate over it
    pub async fn deploy(self, config: PlannerConfig) -> CliResult<SensorGate> {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryStore::new());
        for s in &self.streams {
            let stream = catalog
                .create_stream(&s.owner, &s.name, s.channels.clone(), s.tags.clone())
                .map_err(fixture_error)?;
            store
                .create_stream(&stream)
                .await
                .map_err(fixture_error)?;
        }
        for rule in self.rules {
            catalog.add_rule(rule).map_err(fixture_error)?;
        }
        for inst in &self.instantiations {
            catalog
                .instantiate_template(&inst.owner, &inst.request)
                .map_err(fixture_error)?;
        }
        for m in &self.macros {
            catalog
                .set_macro(&m.owner, &m.name, &m.value)
                .map_err(fixture_error)?;
        }

        let gate = SensorGate::new(store, catalog, config);
        for s in self.streams.iter().filter(|s| !s.tuples.is_empty()) {
            let body = serde_json::to_string(&s.tuples)?;
            gate.ingest_json(&s.owner, &s.name, &body)
                .await
                .map_err(fixture_error)?;
        }
        Ok(gate)
    }
}

fn fixture_error(e: impl std::fmt::Display) -> CliError {
    CliError::fixture_error(e.to_string())
}

/// Dispatch a parsed command
pub async fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::ParseAggregate { expr } => parse_aggregate(&expr),
        Command::Noise {
            aggregate,
            min,
            max,
            epsilon,
            count,
            draws,
        } => noise(&aggregate, SensitivityRange::new(min, max), epsilon, count, draws),
        Command::Resolve {
            fixture,
            owner,
            stream,
            user,
        } => resolve(&fixture, &owner, &stream, &user).await,
        Command::Query { fixture, config } => query(&fixture, config.as_deref()).await,
        Command::Explain { fixture, config } => explain(&fixture, config.as_deref()).await,
    }
}

pub fn parse_aggregate(expr: &str) -> CliResult<()> {
    match parse_aggregate_expr(expr) {
        Ok(spec) => write_response(serde_json::to_value(&spec)?),
        Err(e) => {
            write_error(e.code().code(), e.message())?;
            Err(CliError::command_failed(e.to_string()))
        }
    }
}

pub fn noise(
    aggregate: &str,
    range: SensitivityRange,
    epsilon: f64,
    count: Option<u64>,
    draws: usize,
) -> CliResult<()> {
    let engine = PrivacyNoiseEngine::new();
    let mut rng = thread_rng();
    let result = engine.precision(aggregate, range, epsilon, count).and_then(|lambda| {
        (0..draws)
            .map(|_| engine.sample_with(&mut rng, aggregate, range, epsilon, count))
            .collect::<Result<Vec<_>, _>>()
            .map(|samples| (lambda, samples))
    });

    match result {
        Ok((lambda, samples)) => write_response(json!({
            "precision": lambda,
            "scale": 1.0 / lambda,
            "samples": samples,
        })),
        Err(e) => {
            let err = PlannerError::from(e);
            write_error(err.code().code(), err.message())?;
            Err(CliError::command_failed(err.to_string()))
        }
    }
}

pub async fn resolve(fixture: &Path, owner: &str, stream: &str, user: &str) -> CliResult<()> {
    let gate = Fixture::load(fixture)?.deploy(PlannerConfig::default()).await?;
    let decision = gate
        .resolve_access(owner, stream, user)
        .await
        .or_else(report)?;
    write_response(serde_json::to_value(&decision)?)
}

pub async fn query(fixture: &Path, config: Option<&Path>) -> CliResult<()> {
    let (gate, request) = prepare(fixture, config).await?;
    let cursor = gate.build_and_execute(request).await.or_else(report)?;
    let columns = cursor.schema().names();
    let rows = cursor.collect_all().await.or_else(report)?;
    write_response(json!({
        "columns": columns,
        "rows": rows,
    }))
}

pub async fn explain(fixture: &Path, config: Option<&Path>) -> CliResult<()> {
    let (gate, request) = prepare(fixture, config).await?;
    let explain = gate.explain(request).await;
    write_response(explain.to_json())
}

async fn prepare(fixture: &Path, config: Option<&Path>) -> CliResult<(SensorGate, QueryRequest)> {
    let config = Config::load_or_default(config)?;
    Logger::set_min_severity(config.log_severity()?);
    let gate = Fixture::load(fixture)?.deploy(config.planner).await?;
    let request: QueryRequest = serde_json::from_value(read_request()?)
        .map_err(|e| CliError::io_error(format!("Invalid query request: {}", e)))?;
    Ok((gate, request))
}

/// Writes a planner error as the response and fails the command
fn report<T>(err: PlannerError) -> CliResult<T> {
    write_error(err.code().code(), err.message())?;
    Err(CliError::command_failed(err.to_string()))
}
