//! Three-stage ingestion pipeline
//!
//! ```text
//!  reader ──blocks──▶ parser ──closed minutes──▶ compute
//!    ▲                 │  ▲                        │
//!    └──free buffers───┘  └────drained buckets─────┘
//! ```
//!
//! Every channel is bounded, so a slow stage stalls its producer instead of
//! growing a queue. Read buffers and minute buckets both circulate: the
//! reader only ever owns `blocks_in_flight` buffers and at most
//! `bucket_pool_size` buckets exist at once. Each stage ends when it sees
//! `Shutdown` from upstream, and a stage that dies drops its channel ends so
//! its neighbours fail fast instead of blocking.

mod compute;
mod parser;
mod reader;
mod window;

#[cfg(test)]
mod tests;

pub use compute::{drain_minute, ComputeOutput};
pub use parser::ParserOutput;
pub use reader::ReaderStats;
pub use window::{MinuteSlot, MinuteWindow, Placement};

use crate::answers::{AnswerStore, ServicePairStore};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::minute_stats::{MinuteBucket, PoolStats};
use crate::record::RecordDecoder;
use crate::topology::Topology;
use crossbeam::channel::bounded;
use parser::{ParserChannels, ParserStage};
use std::io::Read;
use std::thread;

/// A run of complete lines plus its byte offset in the input
#[derive(Debug)]
pub struct Block {
    pub data: Vec<u8>,
    pub offset: u64,
}

/// Reader → parser
#[derive(Debug)]
pub enum ParseMsg {
    Block(Block),
    Shutdown,
}

/// A minute that can no longer receive records
#[derive(Debug)]
pub struct ClosedMinute {
    pub minute: usize,
    pub bucket: MinuteBucket,
}

/// Parser → compute
#[derive(Debug)]
pub enum ComputeMsg {
    Minute(ClosedMinute),
    Shutdown,
}

/// Counters collected across the stages
#[derive(Debug, Clone, Copy)]
pub struct IngestStats {
    pub bytes: u64,
    pub blocks: u64,
    pub records: u64,
    pub minutes: usize,
    pub late_pairs: usize,
    pub pool: PoolStats,
}

/// Everything later queries need from one pass over the input
#[derive(Debug)]
pub struct IngestOutput {
    pub topology: Topology,
    pub answers: AnswerStore,
    pub service_pairs: ServicePairStore,
    /// Absolute epoch minute of minute index 0
    pub origin_minute: i64,
    pub minute_count: usize,
    pub stats: IngestStats,
}

/// Run the pipeline over `source` to completion
pub fn ingest<R, D>(source: R, decoder: D, config: &AnalyzerConfig) -> Result<IngestOutput>
where
    R: Read + Send,
    D: RecordDecoder,
{
    config.validate()?;

    let (free_tx, free_rx) = bounded::<Vec<u8>>(config.blocks_in_flight);
    let (block_tx, block_rx) = bounded::<ParseMsg>(config.blocks_in_flight);
    let (closed_tx, closed_rx) = bounded::<ComputeMsg>(config.bucket_pool_size);
    let (drained_tx, drained_rx) = bounded::<MinuteBucket>(config.bucket_pool_size);

    for _ in 0..config.blocks_in_flight {
        free_tx
            .send(Vec::with_capacity(config.block_size))
            .map_err(|_| AnalysisError::StageFailed { stage: "reader" })?;
    }

    let parser = ParserStage::new(
        decoder,
        config.bucket_pool_size,
        config.warmup_minutes,
        ParserChannels {
            blocks: block_rx,
            free_buffers: free_tx,
            closed: closed_tx,
            drained: drained_rx,
        },
    );
    let block_size = config.block_size;

    let (reader_result, parser_result, compute_result) = thread::scope(|scope| {
        let reader = thread::Builder::new()
            .name("rpcwatch-reader".into())
            .spawn_scoped(scope, move || {
                reader::run_reader(source, block_size, free_rx, block_tx)
            })?;
        let parser = thread::Builder::new()
            .name("rpcwatch-parser".into())
            .spawn_scoped(scope, move || parser.run())?;
        let compute = thread::Builder::new()
            .name("rpcwatch-compute".into())
            .spawn_scoped(scope, move || compute::run_compute(closed_rx, drained_tx))?;

        Ok::<_, AnalysisError>((
            join_stage(reader.join(), "reader"),
            join_stage(parser.join(), "parser"),
            join_stage(compute.join(), "compute"),
        ))
    })?;

    let (reader, parser, compute) = match (reader_result, parser_result, compute_result) {
        (Ok(reader), Ok(parser), Ok(compute)) => (reader, parser, compute),
        (reader, parser, compute) => {
            return Err(root_cause([parser.err(), reader.err(), compute.err()]));
        }
    };

    if parser.records == 0 {
        return Err(AnalysisError::EmptyInput);
    }

    tracing::info!(
        bytes = reader.bytes,
        records = parser.records,
        minutes = parser.minute_count,
        ip_pairs = parser.topology.pairs().len(),
        bucket_reuse_pct = parser.pool.reuse_rate(),
        "ingestion complete"
    );

    Ok(IngestOutput {
        stats: IngestStats {
            bytes: reader.bytes,
            blocks: reader.blocks,
            records: parser.records,
            minutes: compute.minutes,
            late_pairs: parser.topology.late_pairs(),
            pool: parser.pool,
        },
        topology: parser.topology,
        answers: compute.answers,
        service_pairs: compute.service_pairs,
        origin_minute: parser.origin_minute,
        minute_count: parser.minute_count,
    })
}

fn join_stage<T>(joined: thread::Result<Result<T>>, stage: &'static str) -> Result<T> {
    joined.unwrap_or_else(|_| {
        tracing::error!(stage, "pipeline stage panicked");
        Err(AnalysisError::StageFailed { stage })
    })
}

/// Pick the error that explains the failure
///
/// A stage whose neighbour died reports `StageFailed`; the neighbour's own
/// error is the interesting one. Candidates are ordered by priority.
fn root_cause<const N: usize>(errors: [Option<AnalysisError>; N]) -> AnalysisError {
    let mut fallback = None;
    for err in errors.into_iter().flatten() {
        if !matches!(err, AnalysisError::StageFailed { .. }) {
            return err;
        }
        fallback.get_or_insert(err);
    }
    fallback.unwrap_or(AnalysisError::StageFailed { stage: "pipeline" })
}
