//! Alert rule parsing
//!
//! One rule per line:
//!
//! ```text
//! id,caller|ALL,responder|ALL,P99|SR,<minutes><'>'|'<'>,threshold
//! 1,ALL,rd_B,P99,2>,100ms
//! 9,rd_A,rd_B,SR,3<,99.5%
//! ```
//!
//! Rules are trusted configuration: any malformed line aborts the run.

use crate::error::{AnalysisError, Result};
use crate::minute_stats::SUCCESS_RATE_SCALE;
use std::fmt;
use std::str::FromStr;

/// Literal that matches any service on one side of a rule
pub const WILDCARD: &str = "ALL";

/// Measured quantity a rule (or path query) refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    P99,
    SuccessRate,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::P99, Metric::SuccessRate];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::P99 => "P99",
            Metric::SuccessRate => "SR",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "P99" => Ok(Metric::P99),
            "SR" => Ok(Metric::SuccessRate),
            other => Err(format!("unknown metric `{}`, expected P99 or SR", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
}

impl Comparison {
    pub fn breaches(self, value: u32, threshold: u32) -> bool {
        match self {
            Comparison::Greater => value > threshold,
            Comparison::Less => value < threshold,
        }
    }
}

/// One side of a rule: a named service or the wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceFilter {
    All,
    Exact(String),
}

impl ServiceFilter {
    fn parse(field: &str) -> std::result::Result<Self, String> {
        match field.trim() {
            "" => Err("empty service name".to_string()),
            WILDCARD => Ok(ServiceFilter::All),
            name => Ok(ServiceFilter::Exact(name.to_string())),
        }
    }

    pub fn matches(&self, service: &str) -> bool {
        match self {
            ServiceFilter::All => true,
            ServiceFilter::Exact(name) => name == service,
        }
    }

    pub fn exact(&self) -> Option<&str> {
        match self {
            ServiceFilter::All => None,
            ServiceFilter::Exact(name) => Some(name),
        }
    }
}

/// A parsed alert rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRule {
    pub id: u32,
    pub caller: ServiceFilter,
    pub responder: ServiceFilter,
    pub metric: Metric,
    pub comparison: Comparison,
    /// Consecutive breaching minutes needed before alerting
    pub duration: u32,
    /// Milliseconds for P99, rate ×10000 for SR
    pub threshold: u32,
}

impl AlertRule {
    /// Parse a single rule line
    ///
    /// # Example
    /// ```
    /// use rpcwatch::rules::{AlertRule, Comparison, Metric};
    ///
    /// let rule = AlertRule::from_line("9,rd_A,rd_B,SR,3<,99.5%").unwrap();
    /// assert_eq!(rule.metric, Metric::SuccessRate);
    /// assert_eq!(rule.comparison, Comparison::Less);
    /// assert_eq!(rule.threshold, 9950);
    /// ```
    pub fn from_line(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(format!("expected 6 comma-separated fields, got {}", fields.len()));
        }

        let id = fields[0]
            .parse::<u32>()
            .map_err(|_| format!("rule id `{}` is not a non-negative integer", fields[0]))?;
        let caller = ServiceFilter::parse(fields[1])?;
        let responder = ServiceFilter::parse(fields[2])?;
        let metric = fields[3].parse::<Metric>()?;
        let (duration, comparison) = parse_window(fields[4])?;
        let threshold = match metric {
            Metric::P99 => parse_millis(fields[5])?,
            Metric::SuccessRate => parse_percent(fields[5])?,
        };

        Ok(Self {
            id,
            caller,
            responder,
            metric,
            comparison,
            duration,
            threshold,
        })
    }

    /// Whether this rule covers the service pair `caller → responder`
    pub fn matches(&self, caller: &str, responder: &str) -> bool {
        self.caller.matches(caller) && self.responder.matches(responder)
    }
}

/// Parse every non-blank line; errors carry the 1-based line number
pub fn parse_rules<I, S>(lines: I) -> Result<Vec<AlertRule>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut rules = Vec::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        let rule = AlertRule::from_line(line).map_err(|reason| AnalysisError::Rule {
            line: idx + 1,
            reason,
        })?;
        rules.push(rule);
    }
    tracing::debug!(rules = rules.len(), "alert rules parsed");
    Ok(rules)
}

/// `3>` → (3, Greater)
fn parse_window(field: &str) -> std::result::Result<(u32, Comparison), String> {
    let (digits, comparison) = if let Some(digits) = field.strip_suffix('>') {
        (digits, Comparison::Greater)
    } else if let Some(digits) = field.strip_suffix('<') {
        (digits, Comparison::Less)
    } else {
        return Err(format!("`{}` must end with `>` or `<`", field));
    };
    let duration = digits
        .parse::<u32>()
        .map_err(|_| format!("duration `{}` is not an integer", digits))?;
    if duration == 0 {
        return Err("duration must be at least one minute".to_string());
    }
    Ok((duration, comparison))
}

/// `100ms` → 100
fn parse_millis(field: &str) -> std::result::Result<u32, String> {
    let digits = field.strip_suffix("ms").unwrap_or(field);
    digits
        .parse::<u32>()
        .map_err(|_| format!("latency threshold `{}` is not a whole number of ms", field))
}

/// `99.5%` → 9950, two decimal digits at most
fn parse_percent(field: &str) -> std::result::Result<u32, String> {
    let text = field.strip_suffix('%').unwrap_or(field);
    let invalid = || format!("success-rate threshold `{}` is not a percentage", field);

    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole = whole.parse::<u32>().map_err(|_| invalid())?;
    let hundredths = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u32>().map_err(|_| invalid())? * 10,
        _ => fraction.parse::<u32>().map_err(|_| invalid())?,
    };

    let scaled = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(hundredths))
        .ok_or_else(invalid)?;
    if u64::from(scaled) > SUCCESS_RATE_SCALE {
        return Err(format!("success-rate threshold `{}` exceeds 100%", field));
    }
    Ok(scaled)
}
