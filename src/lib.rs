//! rpcwatch - streaming RPC call-log analyzer
//!
//! This library ingests a time-ordered log of inter-service calls, keeps
//! per-minute P99 latency and success-rate statistics for every caller/
//! responder IP pair, raises alerts when a rule's threshold is breached for
//! enough consecutive minutes, and answers longest call-chain queries from
//! a precomputed index.

pub mod alert;
pub mod analyzer;
pub mod answers;
pub mod call_graph;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod json_output;
pub mod longest_path;
pub mod minute_stats;
pub mod pipeline;
pub mod query_index;
pub mod record;
pub mod rules;
pub mod topology;
