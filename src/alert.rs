//! Persistence-gated alert evaluation
//!
//! For each IP pair covered by a rule, minutes are walked in order with a
//! run counter. A minute qualifies when its extreme value breaches the
//! threshold (the maximum for `>` rules, the minimum for `<` rules). A
//! silent or non-qualifying minute resets the run. Once the run reaches the
//! rule's duration, every answer of that minute whose own value breaches
//! is reported, not only the extreme one.

use crate::answers::{AnswerStore, MinuteAnswers, PairAnswer};
use crate::call_graph::ServiceId;
use crate::record::format_ip;
use crate::rules::{AlertRule, Comparison, Metric, ServiceFilter};
use crate::topology::{IpPair, Topology};
use std::fmt;

/// Breaching value carried by an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertValue {
    Millis(u32),
    /// Rate ×10000
    Rate(u32),
}

impl fmt::Display for AlertValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AlertValue::Millis(ms) => write!(f, "{}ms", ms),
            AlertValue::Rate(rate) => f.write_str(&format_rate(rate)),
        }
    }
}

/// `9950` → `99.50%`
pub fn format_rate(rate: u32) -> String {
    format!("{}.{:02}%", rate / 100, rate % 100)
}

/// One emitted alert
///
/// Displays as `ruleId,minute,caller,callerIp,responder,responderIp,value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub rule_id: u32,
    pub minute: String,
    pub caller: String,
    pub caller_ip: u32,
    pub responder: String,
    pub responder_ip: u32,
    pub value: AlertValue,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.rule_id,
            self.minute,
            self.caller,
            format_ip(self.caller_ip),
            self.responder,
            format_ip(self.responder_ip),
            self.value
        )
    }
}

/// Evaluates rules against finalized answers
pub struct AlertEvaluator<'a> {
    topology: &'a Topology,
    answers: &'a AnswerStore,
    /// Minute strings, indexed by minute
    labels: &'a [String],
}

impl<'a> AlertEvaluator<'a> {
    pub fn new(topology: &'a Topology, answers: &'a AnswerStore, labels: &'a [String]) -> Self {
        Self {
            topology,
            answers,
            labels,
        }
    }

    /// Alerts for every rule, in rule order
    pub fn evaluate_all(&self, rules: &[AlertRule]) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for rule in rules {
            let before = events.len();
            self.evaluate_into(rule, &mut events);
            tracing::debug!(rule = rule.id, alerts = events.len() - before, "rule evaluated");
        }
        events
    }

    pub fn evaluate(&self, rule: &AlertRule) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        self.evaluate_into(rule, &mut events);
        events
    }

    /// IP pairs a rule covers, in registration order
    pub fn matching_pairs(&self, rule: &AlertRule) -> Vec<IpPair> {
        let Some(caller) = self.resolve(&rule.caller) else {
            return Vec::new();
        };
        let Some(responder) = self.resolve(&rule.responder) else {
            return Vec::new();
        };
        self.topology
            .pairs()
            .iter()
            .filter(|pair| {
                caller.map_or(true, |id| pair.caller == id)
                    && responder.map_or(true, |id| pair.responder == id)
            })
            .copied()
            .collect()
    }

    /// `Some(None)` for the wildcard, `None` for an unknown service
    fn resolve(&self, filter: &ServiceFilter) -> Option<Option<ServiceId>> {
        match filter.exact() {
            None => Some(None),
            Some(name) => self.topology.services().get(name).map(Some),
        }
    }

    fn evaluate_into(&self, rule: &AlertRule, events: &mut Vec<AlertEvent>) {
        for pair in self.matching_pairs(rule) {
            let Some(timeline) = self.answers.timeline(pair.key()) else {
                continue;
            };

            let mut run = 0u32;
            for (minute, label) in self.labels.iter().enumerate() {
                let Some(answers) = timeline.minute(minute).filter(|m| !m.is_empty()) else {
                    run = 0;
                    continue;
                };
                if !rule
                    .comparison
                    .breaches(extreme(answers, rule), rule.threshold)
                {
                    run = 0;
                    continue;
                }
                run = run.saturating_add(1);
                if run < rule.duration {
                    continue;
                }

                for answer in answers.answers() {
                    let value = metric_value(answer, rule.metric);
                    if rule.comparison.breaches(value, rule.threshold) {
                        events.push(self.event(rule, &pair, label, answer));
                    }
                }
            }
        }
    }

    fn event(&self, rule: &AlertRule, pair: &IpPair, label: &str, answer: &PairAnswer) -> AlertEvent {
        let services = self.topology.services();
        AlertEvent {
            rule_id: rule.id,
            minute: label.to_string(),
            caller: services.name(pair.caller).to_string(),
            caller_ip: answer.caller_ip,
            responder: services.name(pair.responder).to_string(),
            responder_ip: answer.responder_ip,
            value: match rule.metric {
                Metric::P99 => AlertValue::Millis(answer.p99),
                Metric::SuccessRate => AlertValue::Rate(answer.success_rate),
            },
        }
    }
}

/// The value that decides whether a minute qualifies
fn extreme(answers: &MinuteAnswers, rule: &AlertRule) -> u32 {
    match (rule.metric, rule.comparison) {
        (Metric::P99, Comparison::Greater) => answers.max_p99(),
        (Metric::P99, Comparison::Less) => answers.min_p99(),
        (Metric::SuccessRate, Comparison::Greater) => answers.max_rate(),
        (Metric::SuccessRate, Comparison::Less) => answers.min_rate(),
    }
}

fn metric_value(answer: &PairAnswer, metric: Metric) -> u32 {
    match metric {
        Metric::P99 => answer.p99,
        Metric::SuccessRate => answer.success_rate,
    }
}
