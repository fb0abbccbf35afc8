//! CLI argument parsing for rpcwatch

use crate::config::AnalyzerConfig;
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for alerts and path queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Alert lines, then one block per query (default)
    Text,
    /// A single JSON document
    Json,
}

/// One longest-path query: `caller,responder,yyyy-MM-dd HH:mm,P99|SR`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    pub caller: String,
    pub responder: String,
    pub minute: String,
    pub metric: String,
}

/// Parse a query argument or queries-file line
pub fn parse_query(text: &str) -> std::result::Result<PathQuery, String> {
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    match fields.as_slice() {
        [caller, responder, minute, metric] if fields.iter().all(|f| !f.is_empty()) => {
            Ok(PathQuery {
                caller: caller.to_string(),
                responder: responder.to_string(),
                minute: minute.to_string(),
                metric: metric.to_string(),
            })
        }
        _ => Err(format!(
            "expected `caller,responder,yyyy-MM-dd HH:mm,P99|SR`, got `{}`",
            text
        )),
    }
}

#[derive(Parser, Debug)]
#[command(name = "rpcwatch")]
#[command(version)]
#[command(
    about = "Streaming RPC call-log analyzer: persistence-gated alerts and longest call-chain queries",
    long_about = None
)]
pub struct Cli {
    /// Call log to analyze (one record per line)
    #[arg(short, long, value_name = "LOG")]
    pub input: PathBuf,

    /// Alert rules file (one rule per line)
    #[arg(short, long, value_name = "RULES")]
    pub rules: PathBuf,

    /// TOML file with analyzer settings
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Longest-path query, repeatable (e.g. "rd_A,rd_B,2020-06-23 00:01,P99")
    #[arg(short = 'q', long = "query", value_name = "QUERY", value_parser = parse_query)]
    pub queries: Vec<PathQuery>,

    /// File with one longest-path query per line
    #[arg(long = "queries", value_name = "FILE")]
    pub queries_file: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Bytes read per block (overrides the config file)
    #[arg(long = "block-size", value_name = "BYTES")]
    pub block_size: Option<usize>,

    /// UTC offset in minutes for minute strings (overrides the config file)
    #[arg(long = "utc-offset", value_name = "MINUTES", allow_hyphen_values = true)]
    pub utc_offset: Option<i32>,

    /// Index longest paths for every edge, not only rule-referenced ones
    #[arg(long = "all-edges")]
    pub all_edges: bool,

    /// Enable debug tracing output (writes to stderr)
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied
    pub fn analyzer_config(&self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => AnalyzerConfig::from_toml_file(path)?,
            None => AnalyzerConfig::default(),
        };
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(offset) = self.utc_offset {
            config.utc_offset_minutes = offset;
        }
        if self.all_edges {
            config.materialize_all_edges = true;
        }
        config.validate()?;
        Ok(config)
    }
}
