//! Analyzer facade
//!
//! [`AlertAnalyzer::alarm_monitor`] runs the whole batch: ingest the log,
//! evaluate the rules, then materialize and index longest paths for the
//! edges the rules touch. [`AlertAnalyzer::get_longest_path`] answers path
//! queries from that index afterwards.
//!
//! # Example
//!
//! ```no_run
//! use rpcwatch::analyzer::AlertAnalyzer;
//!
//! # fn main() -> rpcwatch::error::Result<()> {
//! let mut analyzer = AlertAnalyzer::default();
//! let alerts = analyzer.alarm_monitor("calls.log", &["1,ALL,rd_B,P99,2>,100ms"])?;
//! for alert in &alerts {
//!     println!("{}", alert);
//! }
//! let paths = analyzer.get_longest_path("rd_A", "rd_B", "2020-06-23 00:01", "P99");
//! # Ok(())
//! # }
//! ```

use crate::alert::{AlertEvaluator, AlertEvent};
use crate::call_graph::ServiceId;
use crate::clock::MinuteClock;
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::longest_path::{LongestPathEngine, PathMaterializer};
use crate::pipeline::{self, IngestOutput};
use crate::query_index::{build_index, PathIndex};
use crate::record::CsvRecordDecoder;
use crate::rules::{parse_rules, AlertRule, Metric};
use crate::topology::Topology;
use fnv::FnvHashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Counts from the last run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub records: u64,
    pub minutes: usize,
    pub services: usize,
    pub ip_pairs: usize,
    pub edges: usize,
    pub alerts: usize,
    pub indexed_keys: usize,
    pub index_strategy: &'static str,
}

struct QueryState {
    index: Box<dyn PathIndex>,
    clock: MinuteClock,
    summary: AnalysisSummary,
}

#[derive(Default)]
pub struct AlertAnalyzer {
    config: AnalyzerConfig,
    state: Option<QueryState>,
}

impl AlertAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze the log at `path`, returning alert lines
    pub fn alarm_monitor<P, S>(&mut self, path: P, rules: &[S]) -> Result<Vec<String>>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let rules = parse_rules(rules)?;
        let file = File::open(path.as_ref())?;
        let events = self.analyze(file, &rules)?;
        Ok(events.iter().map(ToString::to_string).collect())
    }

    /// Analyze any byte source against parsed rules
    ///
    /// Replaces the path index of any previous run.
    pub fn analyze<R: Read + Send>(&mut self, source: R, rules: &[AlertRule]) -> Result<Vec<AlertEvent>> {
        self.state = None;
        let IngestOutput {
            topology,
            answers,
            mut service_pairs,
            origin_minute,
            minute_count,
            stats,
        } = pipeline::ingest(source, CsvRecordDecoder, &self.config)?;

        let clock = MinuteClock::new(origin_minute, self.config.utc_offset_minutes).ok_or_else(|| {
            AnalysisError::Config(format!(
                "utc_offset_minutes {} is out of range",
                self.config.utc_offset_minutes
            ))
        })?;
        let labels = clock.labels(minute_count);

        let alerts = AlertEvaluator::new(&topology, &answers, &labels).evaluate_all(rules);

        let edges = if self.config.materialize_all_edges {
            topology.graph().edges().collect()
        } else {
            rule_edges(rules, &topology)
        };
        let engine = LongestPathEngine::new(topology.graph());
        let entries =
            PathMaterializer::new(&engine, &topology, &mut service_pairs, &labels).materialize(&edges);
        let index = build_index(entries, &self.config.perfect_hash);

        let summary = AnalysisSummary {
            records: stats.records,
            minutes: minute_count,
            services: topology.services().len(),
            ip_pairs: topology.pairs().len(),
            edges: topology.graph().edge_count(),
            alerts: alerts.len(),
            indexed_keys: index.len(),
            index_strategy: index.strategy(),
        };
        tracing::info!(
            alerts = summary.alerts,
            path_edges = edges.len(),
            indexed_keys = summary.indexed_keys,
            strategy = summary.index_strategy,
            "analysis complete"
        );
        self.state = Some(QueryState {
            index,
            clock,
            summary,
        });
        Ok(alerts)
    }

    /// Longest annotated paths through `caller → responder` in `minute`
    ///
    /// `metric` is `P99` or `SR`. Anything unknown, including a call before
    /// the first analysis or a minute outside the analyzed range, yields an
    /// empty slice.
    pub fn get_longest_path(&self, caller: &str, responder: &str, minute: &str, metric: &str) -> &[String] {
        let (Some(state), Ok(metric)) = (&self.state, metric.parse::<Metric>()) else {
            return &[];
        };
        let in_range = state
            .clock
            .minute_of(minute)
            .is_some_and(|index| index < state.summary.minutes);
        if !in_range {
            return &[];
        }
        state.index.lookup(caller, responder, minute.trim(), metric)
    }

    pub fn summary(&self) -> Option<&AnalysisSummary> {
        self.state.as_ref().map(|state| &state.summary)
    }
}

/// Graph edges covered by at least one rule, first-match order
pub fn rule_edges(rules: &[AlertRule], topology: &Topology) -> Vec<(ServiceId, ServiceId)> {
    let services = topology.services();
    let mut seen = FnvHashSet::default();
    let mut edges = Vec::new();
    for rule in rules {
        for (caller, responder) in topology.graph().edges() {
            if rule.matches(services.name(caller), services.name(responder))
                && seen.insert((caller, responder))
            {
                edges.push((caller, responder));
            }
        }
    }
    edges
}
