use anyhow::{Context, Result};
use clap::Parser;
use rpcwatch::analyzer::AlertAnalyzer;
use rpcwatch::cli::{parse_query, Cli, OutputFormat, PathQuery};
use rpcwatch::json_output::{JsonOutput, JsonQueryResult};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber
///
/// `--debug` turns on everything; otherwise `RUST_LOG` decides, warnings by default.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Queries from `--query` followed by those in `--queries FILE`
fn collect_queries(args: &Cli) -> Result<Vec<PathQuery>> {
    let mut queries = args.queries.clone();
    if let Some(path) = &args.queries_file {
        queries.extend(read_queries(path)?);
    }
    Ok(queries)
}

fn read_queries(path: &Path) -> Result<Vec<PathQuery>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read queries file {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            parse_query(line).map_err(|reason| {
                anyhow::anyhow!("{}:{}: {}", path.display(), idx + 1, reason)
            })
        })
        .collect()
}

fn write_text(
    out: &mut impl Write,
    alerts: &[String],
    analyzer: &AlertAnalyzer,
    queries: &[PathQuery],
) -> io::Result<()> {
    for alert in alerts {
        writeln!(out, "{}", alert)?;
    }
    for query in queries {
        writeln!(
            out,
            "# {},{},{},{}",
            query.caller, query.responder, query.minute, query.metric
        )?;
        for path in
            analyzer.get_longest_path(&query.caller, &query.responder, &query.minute, &query.metric)
        {
            writeln!(out, "{}", path)?;
        }
    }
    Ok(())
}

fn json_report(alerts: Vec<String>, analyzer: &AlertAnalyzer, queries: &[PathQuery]) -> JsonOutput {
    let mut output = JsonOutput::new();
    for alert in alerts {
        output.add_alert(alert);
    }
    for query in queries {
        output.add_query(JsonQueryResult {
            caller: query.caller.clone(),
            responder: query.responder.clone(),
            minute: query.minute.clone(),
            metric: query.metric.clone(),
            paths: analyzer
                .get_longest_path(&query.caller, &query.responder, &query.minute, &query.metric)
                .to_vec(),
        });
    }
    output
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = args.analyzer_config().context("invalid configuration")?;
    let queries = collect_queries(&args)?;
    let rules_text = fs::read_to_string(&args.rules)
        .with_context(|| format!("failed to read rules file {}", args.rules.display()))?;
    let rules: Vec<&str> = rules_text.lines().collect();

    let mut analyzer = AlertAnalyzer::new(config);
    let alerts = analyzer
        .alarm_monitor(&args.input, rules.as_slice())
        .with_context(|| format!("failed to analyze {}", args.input.display()))?;

    if let Some(summary) = analyzer.summary() {
        tracing::info!(
            records = summary.records,
            minutes = summary.minutes,
            services = summary.services,
            ip_pairs = summary.ip_pairs,
            strategy = summary.index_strategy,
            "run summary"
        );
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match args.format {
        OutputFormat::Text => write_text(&mut out, &alerts, &analyzer, &queries)?,
        OutputFormat::Json => {
            let json = json_report(alerts, &analyzer, &queries).to_json()?;
            writeln!(out, "{}", json)?;
        }
    }
    out.flush()?;
    Ok(())
}
