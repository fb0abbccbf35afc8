//! Compute stage
//!
//! Drains closed minutes: for every filled IP-pair slot the samples are
//! first rolled into the service-pair store, then P99 and the success rate
//! are taken (the latter resets the slot). The emptied bucket goes back to
//! the parser for reuse.

use super::ComputeMsg;
use crate::answers::{AnswerStore, PairAnswer, ServicePairStore};
use crate::error::{AnalysisError, Result};
use crate::minute_stats::MinuteBucket;
use crossbeam::channel::{Receiver, Sender};

#[derive(Debug, Default)]
pub struct ComputeOutput {
    pub answers: AnswerStore,
    pub service_pairs: ServicePairStore,
    pub minutes: usize,
}

pub(crate) fn run_compute(
    closed: Receiver<ComputeMsg>,
    drained: Sender<MinuteBucket>,
) -> Result<ComputeOutput> {
    let mut output = ComputeOutput::default();
    let mut last_minute: Option<usize> = None;

    loop {
        let msg = closed
            .recv()
            .map_err(|_| AnalysisError::StageFailed { stage: "parser" })?;
        match msg {
            ComputeMsg::Minute(mut closed_minute) => {
                if last_minute.is_some_and(|last| closed_minute.minute <= last) {
                    tracing::warn!(
                        minute = closed_minute.minute,
                        "minute closed out of order"
                    );
                }
                last_minute = Some(closed_minute.minute);

                drain_minute(
                    closed_minute.minute,
                    &mut closed_minute.bucket,
                    &mut output.answers,
                    &mut output.service_pairs,
                );
                output.minutes += 1;
                // Parser gone means it is shutting down on an error
                let _ = drained.send(closed_minute.bucket);
            }
            ComputeMsg::Shutdown => break,
        }
    }

    tracing::debug!(minutes = output.minutes, "compute finished");
    Ok(output)
}

/// Turn one closed bucket into answers, leaving it empty
pub fn drain_minute(
    minute: usize,
    bucket: &mut MinuteBucket,
    answers: &mut AnswerStore,
    service_pairs: &mut ServicePairStore,
) {
    for slot in bucket.filled_slots_mut() {
        let pair = slot.pair;
        service_pairs.absorb(pair.caller, pair.responder, minute, &slot.samples);

        let p99 = slot.samples.p99();
        let rate = slot.samples.success_rate();
        if let (Some(p99), Some(success_rate)) = (p99, rate) {
            answers.record(
                pair,
                minute,
                PairAnswer {
                    p99,
                    success_rate,
                    caller_ip: pair.caller_ip,
                    responder_ip: pair.responder_ip,
                },
            );
        }
    }
    bucket.reset();
}
