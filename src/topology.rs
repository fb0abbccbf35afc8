//! Service and IP-pair registry
//!
//! Dense ids are handed out on first sighting and never change for the rest
//! of the run. Every per-service table in the crate is indexed by these ids.
//!
//! The full universe of IP pairs is expected to show up during the first few
//! minutes (the warm-up window). A pair first seen later is still registered,
//! but is reported once via `tracing::warn!`: buckets allocated before that
//! point were not pre-sized for it.

use crate::call_graph::{CallGraph, ServiceId};
use crate::record::{IpPairKey, RawCall};
use fnv::FnvHashMap;

/// Bijective service name ↔ id table
#[derive(Debug, Clone, Default)]
pub struct ServiceInterner {
    ids: FnvHashMap<String, ServiceId>,
    names: Vec<String>,
}

impl ServiceInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, assigning the next dense id on first sighting
    pub fn intern(&mut self, name: &str) -> ServiceId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = ServiceId(self.names.len() as u32);
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn get(&self, name: &str) -> Option<ServiceId> {
        self.ids.get(name).copied()
    }

    /// Name of a previously interned id
    pub fn name(&self, id: ServiceId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A (caller, callerIp, responder, responderIp) measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPair {
    pub caller: ServiceId,
    pub caller_ip: u32,
    pub responder: ServiceId,
    pub responder_ip: u32,
}

impl IpPair {
    pub fn key(&self) -> IpPairKey {
        IpPairKey::pack(self.caller_ip, self.responder_ip)
    }
}

/// Everything discovered about the call population during ingestion
#[derive(Debug, Clone, Default)]
pub struct Topology {
    services: ServiceInterner,
    pairs: Vec<IpPair>,
    pair_index: FnvHashMap<IpPairKey, usize>,
    graph: CallGraph,
    late_pairs: usize,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the IP pair of `call` (and its services and graph edge)
    ///
    /// Returns the pair that owns the packed key. The call graph always
    /// records the call's service pair, even when its key already belongs
    /// to another service pair; samples for such a call merge into the
    /// existing pair.
    pub fn register(&mut self, call: &RawCall<'_>, after_warmup: bool) -> IpPair {
        let key = call.pair_key();
        if let Some(&idx) = self.pair_index.get(&key) {
            let existing = self.pairs[idx];
            if self.services.name(existing.caller) != call.caller
                || self.services.name(existing.responder) != call.responder
            {
                self.link_services(call);
            }
            return existing;
        }

        let (caller, responder) = self.link_services(call);
        let pair = IpPair {
            caller,
            caller_ip: call.caller_ip,
            responder,
            responder_ip: call.responder_ip,
        };
        self.pair_index.insert(key, self.pairs.len());
        self.pairs.push(pair);

        if after_warmup {
            self.late_pairs += 1;
            tracing::warn!(
                caller = call.caller,
                responder = call.responder,
                key = %key,
                "ip pair first seen after warm-up window"
            );
        }
        pair
    }

    /// Intern both services of `call` and add their edge
    fn link_services(&mut self, call: &RawCall<'_>) -> (ServiceId, ServiceId) {
        let caller = self.services.intern(call.caller);
        let responder = self.services.intern(call.responder);
        self.graph.add_node(caller);
        self.graph.add_node(responder);
        self.graph.add_edge(caller, responder);
        (caller, responder)
    }

    pub fn pair(&self, key: IpPairKey) -> Option<&IpPair> {
        self.pair_index.get(&key).map(|&idx| &self.pairs[idx])
    }

    /// All IP pairs in registration order
    pub fn pairs(&self) -> &[IpPair] {
        &self.pairs
    }

    pub fn services(&self) -> &ServiceInterner {
        &self.services
    }

    pub fn graph(&self) -> &CallGraph {
        &self.graph
    }

    /// Pairs registered after the warm-up window closed
    pub fn late_pairs(&self) -> usize {
        self.late_pairs
    }
}
