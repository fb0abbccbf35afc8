//! Parser stage
//!
//! Owns the decoder, the topology, the minute window and the bucket pool.
//! Each block is split into lines, every line decoded and its sample routed
//! to the bucket of its minute. Closed minutes go to the compute stage; the
//! compute stage sends drained buckets back here, where they re-enter the
//! pool.

use super::window::{MinuteWindow, Placement};
use super::{Block, ClosedMinute, ComputeMsg, ParseMsg};
use crate::error::{AnalysisError, Result};
use crate::minute_stats::{BucketPool, MinuteBucket, PoolStats};
use crate::record::{RawCall, RecordDecoder};
use crate::topology::Topology;
use crossbeam::channel::{Receiver, Sender};

/// What the parser hands back once the input is exhausted
#[derive(Debug)]
pub struct ParserOutput {
    pub topology: Topology,
    /// Absolute epoch minute of minute index 0
    pub origin_minute: i64,
    pub minute_count: usize,
    pub records: u64,
    pub pool: PoolStats,
}

pub(crate) struct ParserChannels {
    pub blocks: Receiver<ParseMsg>,
    pub free_buffers: Sender<Vec<u8>>,
    pub closed: Sender<ComputeMsg>,
    pub drained: Receiver<MinuteBucket>,
}

pub(crate) struct ParserStage<D> {
    decoder: D,
    topology: Topology,
    window: Option<MinuteWindow>,
    pool: BucketPool,
    origin: Option<i64>,
    warmup_minutes: i64,
    warmup_reported: bool,
    records: u64,
    channels: ParserChannels,
}

impl<D: RecordDecoder> ParserStage<D> {
    pub fn new(decoder: D, pool_size: usize, warmup_minutes: u32, channels: ParserChannels) -> Self {
        Self {
            decoder,
            topology: Topology::new(),
            window: None,
            pool: BucketPool::new(pool_size),
            origin: None,
            warmup_minutes: i64::from(warmup_minutes),
            warmup_reported: false,
            records: 0,
            channels,
        }
    }

    pub fn run(mut self) -> Result<ParserOutput> {
        loop {
            let msg = self
                .channels
                .blocks
                .recv()
                .map_err(|_| AnalysisError::StageFailed { stage: "reader" })?;
            match msg {
                ParseMsg::Block(block) => {
                    self.process_block(&block)?;
                    // The reader may already be done; a dropped buffer is fine then
                    let _ = self.channels.free_buffers.send(block.data);
                }
                ParseMsg::Shutdown => break,
            }
        }
        self.finish()
    }

    fn process_block(&mut self, block: &Block) -> Result<()> {
        let mut offset = block.offset;
        for line in block.data.split(|&b| b == b'\n') {
            let line_start = offset;
            offset += line.len() as u64 + 1;

            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let call = self
                .decoder
                .decode(line)
                .map_err(|reason| AnalysisError::Decode {
                    offset: line_start,
                    reason,
                })?;
            self.ingest(&call)?;
        }
        Ok(())
    }

    fn ingest(&mut self, call: &RawCall<'_>) -> Result<()> {
        let epoch_minute = call.epoch_minute();
        let origin = *self.origin.get_or_insert(epoch_minute);
        let minute = epoch_minute - origin;

        if self.window.is_none() {
            let bucket = self.acquire_bucket()?;
            self.window = Some(MinuteWindow::open(0, bucket));
        }

        let placement = self.place(minute)?;
        // place() may have moved the origin back a minute
        let minute = epoch_minute - self.origin.unwrap_or(origin);
        let after_warmup = minute >= self.warmup_minutes;
        let Some(window) = self.window.as_mut() else {
            return Err(AnalysisError::StageFailed { stage: "parser" });
        };
        let current = window.current_minute();
        let Some(bucket) = window.bucket_mut(placement) else {
            return Err(AnalysisError::SkewExceeded { minute, current });
        };

        let pair = self.topology.register(call, after_warmup);
        bucket.slot(pair).add(call.elapsed_ms, call.success);
        self.records += 1;
        Ok(())
    }

    /// Resolve where `minute` goes, rolling the window forward if needed
    fn place(&mut self, minute: i64) -> Result<Placement> {
        let (placement, current) = match self.window.as_ref() {
            Some(window) => (window.place(minute), window.current_minute()),
            None => return Err(AnalysisError::StageFailed { stage: "parser" }),
        };

        match placement {
            Placement::Current | Placement::Previous => Ok(placement),
            Placement::Ahead(steps) => {
                for _ in 0..steps {
                    self.advance()?;
                }
                Ok(Placement::Current)
            }
            // First record was a minute late: its predecessor becomes minute 0
            Placement::Behind if minute == -1 && current == 0 => {
                let fresh = self.acquire_bucket()?;
                if let Some(window) = self.window.as_mut() {
                    match window.extend_back(fresh) {
                        Ok(()) => {
                            self.origin = self.origin.map(|origin| origin - 1);
                            tracing::debug!("origin moved back one minute for a late record");
                            return Ok(Placement::Previous);
                        }
                        Err(fresh) => self.pool.release(fresh),
                    }
                }
                Err(AnalysisError::SkewExceeded { minute, current })
            }
            Placement::Behind => Err(AnalysisError::SkewExceeded { minute, current }),
        }
    }

    fn advance(&mut self) -> Result<()> {
        let fresh = self.acquire_bucket()?;
        let Some(window) = self.window.as_mut() else {
            return Err(AnalysisError::StageFailed { stage: "parser" });
        };
        let closed = window.advance(fresh);
        let opened = window.current_minute();

        if !self.warmup_reported && opened >= self.warmup_minutes {
            self.warmup_reported = true;
            let graph = self.topology.graph();
            tracing::info!(
                services = self.topology.services().len(),
                ip_pairs = self.topology.pairs().len(),
                edges = graph.edge_count(),
                "warm-up window complete"
            );
        }

        if let Some(slot) = closed {
            self.send_closed(slot.minute, slot.bucket)?;
        }
        Ok(())
    }

    fn send_closed(&self, minute: i64, bucket: MinuteBucket) -> Result<()> {
        tracing::debug!(
            minute,
            pairs = bucket.pair_count(),
            samples = bucket.sample_count(),
            "minute closed"
        );
        self.channels
            .closed
            .send(ComputeMsg::Minute(ClosedMinute {
                minute: minute as usize,
                bucket,
            }))
            .map_err(|_| AnalysisError::StageFailed { stage: "compute" })
    }

    /// Take a bucket from the pool, waiting on the compute stage if all are in flight
    fn acquire_bucket(&mut self) -> Result<MinuteBucket> {
        loop {
            while let Ok(bucket) = self.channels.drained.try_recv() {
                self.pool.release(bucket);
            }
            let pairs = self.topology.pairs();
            if let Some(bucket) = self.pool.acquire(|| MinuteBucket::with_pairs(pairs)) {
                return Ok(bucket);
            }
            let bucket = self
                .channels
                .drained
                .recv()
                .map_err(|_| AnalysisError::StageFailed { stage: "compute" })?;
            self.pool.release(bucket);
        }
    }

    fn finish(mut self) -> Result<ParserOutput> {
        let minute_count = match self.window.take() {
            Some(window) => {
                let count = window.current_minute() as usize + 1;
                for slot in window.into_slots() {
                    self.send_closed(slot.minute, slot.bucket)?;
                }
                count
            }
            None => 0,
        };
        self.channels
            .closed
            .send(ComputeMsg::Shutdown)
            .map_err(|_| AnalysisError::StageFailed { stage: "compute" })?;

        tracing::debug!(records = self.records, minutes = minute_count, "parser finished");
        Ok(ParserOutput {
            topology: self.topology,
            origin_minute: self.origin.unwrap_or_default(),
            minute_count,
            records: self.records,
            pool: self.pool.stats(),
        })
    }
}
