//! Finalized per-minute answers
//!
//! Two stores are filled by the compute stage as minutes close:
//!
//! - [`AnswerStore`]: P99 and success rate per IP pair per minute, used by
//!   the alert evaluator.
//! - [`ServicePairStore`]: raw samples rolled up per service pair per minute,
//!   used by the longest-path engine to annotate each hop.

use crate::call_graph::ServiceId;
use crate::minute_stats::LatencySamples;
use crate::record::IpPairKey;
use crate::topology::IpPair;
use fnv::FnvHashMap;

/// P99 and success rate of one IP pair in one minute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairAnswer {
    pub p99: u32,
    /// Success rate ×10000
    pub success_rate: u32,
    pub caller_ip: u32,
    pub responder_ip: u32,
}

/// All answers of one pair in one minute, with running extremes
#[derive(Debug, Clone)]
pub struct MinuteAnswers {
    answers: Vec<PairAnswer>,
    max_p99: u32,
    min_p99: u32,
    max_rate: u32,
    min_rate: u32,
}

impl Default for MinuteAnswers {
    fn default() -> Self {
        Self {
            answers: Vec::new(),
            max_p99: 0,
            min_p99: u32::MAX,
            max_rate: 0,
            min_rate: u32::MAX,
        }
    }
}

impl MinuteAnswers {
    pub fn add(&mut self, answer: PairAnswer) {
        self.max_p99 = self.max_p99.max(answer.p99);
        self.min_p99 = self.min_p99.min(answer.p99);
        self.max_rate = self.max_rate.max(answer.success_rate);
        self.min_rate = self.min_rate.min(answer.success_rate);
        self.answers.push(answer);
    }

    pub fn answers(&self) -> &[PairAnswer] {
        &self.answers
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn max_p99(&self) -> u32 {
        self.max_p99
    }

    pub fn min_p99(&self) -> u32 {
        self.min_p99
    }

    pub fn max_rate(&self) -> u32 {
        self.max_rate
    }

    pub fn min_rate(&self) -> u32 {
        self.min_rate
    }
}

/// Minute-indexed answers for one IP pair
#[derive(Debug, Clone)]
pub struct PairTimeline {
    pub pair: IpPair,
    minutes: Vec<Option<MinuteAnswers>>,
}

impl PairTimeline {
    /// Answers for `minute`, `None` if the pair was silent
    pub fn minute(&self, minute: usize) -> Option<&MinuteAnswers> {
        self.minutes.get(minute).and_then(Option::as_ref)
    }
}

/// Answers for every IP pair, in first-answer order
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    timelines: Vec<PairTimeline>,
    index: FnvHashMap<IpPairKey, usize>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, pair: IpPair, minute: usize, answer: PairAnswer) {
        let idx = match self.index.get(&pair.key()) {
            Some(&idx) => idx,
            None => {
                self.index.insert(pair.key(), self.timelines.len());
                self.timelines.push(PairTimeline {
                    pair,
                    minutes: Vec::new(),
                });
                self.timelines.len() - 1
            }
        };
        let minutes = &mut self.timelines[idx].minutes;
        if minutes.len() <= minute {
            minutes.resize(minute + 1, None);
        }
        minutes[minute].get_or_insert_with(MinuteAnswers::default).add(answer);
    }

    pub fn timeline(&self, key: IpPairKey) -> Option<&PairTimeline> {
        self.index.get(&key).map(|&idx| &self.timelines[idx])
    }

    pub fn timelines(&self) -> &[PairTimeline] {
        &self.timelines
    }
}

/// Aggregate P99 and success rate of a service pair in one minute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopStats {
    pub p99: u32,
    pub success_rate: u32,
}

/// Samples rolled up per (caller service, responder service) per minute
#[derive(Debug, Clone, Default)]
pub struct ServicePairStore {
    by_pair: FnvHashMap<(ServiceId, ServiceId), Vec<Option<LatencySamples>>>,
}

impl ServicePairStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one IP pair's samples into its service pair for `minute`
    pub fn absorb(
        &mut self,
        caller: ServiceId,
        responder: ServiceId,
        minute: usize,
        samples: &LatencySamples,
    ) {
        let minutes = self.by_pair.entry((caller, responder)).or_default();
        if minutes.len() <= minute {
            minutes.resize(minute + 1, None);
        }
        minutes[minute]
            .get_or_insert_with(|| LatencySamples::with_capacity(samples.size()))
            .add_all(samples);
    }

    /// Aggregate stats for a hop, `None` when it saw no calls that minute
    pub fn hop_stats(
        &mut self,
        caller: ServiceId,
        responder: ServiceId,
        minute: usize,
    ) -> Option<HopStats> {
        let samples = self
            .by_pair
            .get_mut(&(caller, responder))?
            .get_mut(minute)?
            .as_mut()?;
        Some(HopStats {
            p99: samples.safe_p99()?,
            success_rate: samples.safe_success_rate()?,
        })
    }

    pub fn service_pair_count(&self) -> usize {
        self.by_pair.len()
    }
}
