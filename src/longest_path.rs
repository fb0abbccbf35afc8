//! Longest call chains through the service graph
//!
//! # Algorithm
//!
//! Kahn-style topological DP seeded by every node with out-degree zero:
//!
//! ```text
//! 1. queue ← nodes with no outgoing edges; chains[w] = [[w]]
//! 2. pop w (all successors of w are already final):
//!      best = max chain length over successors of w
//!      chains[w] = w ++ c  for every successor chain c of length best
//! 3. for each predecessor u of w: out[u] -= 1; enqueue u when it hits 0
//! ```
//!
//! Ties at the maximum length are all kept. Running the DP on the forward
//! graph yields the longest chains *starting* at each node; running it on the
//! reverse graph yields the longest chains *ending* at each node. The longest
//! chains through an edge `c → r` are then every ending-at-`c` chain joined
//! with every starting-at-`r` chain.
//!
//! Nodes on a cycle never reach out-degree zero and keep an empty chain set.
//!
//! # Example
//!
//! ```text
//!   A → B → D
//!   A → C → D      chains starting at A: A→B→D, A→C→D
//! ```

use crate::alert::format_rate;
use crate::answers::ServicePairStore;
use crate::call_graph::{Adjacency, CallGraph, ServiceId};
use crate::query_index::PathKey;
use crate::rules::Metric;
use crate::topology::Topology;
use std::collections::VecDeque;

/// Service ids in caller → responder order
pub type Chain = Vec<ServiceId>;

/// Per-node longest chains in both directions
#[derive(Debug, Clone)]
pub struct LongestPathEngine {
    /// Longest chains starting at each node
    suffixes: Vec<Vec<Chain>>,
    /// Longest chains ending at each node, caller first
    prefixes: Vec<Vec<Chain>>,
}

impl LongestPathEngine {
    pub fn new(graph: &CallGraph) -> Self {
        let node_count = graph.node_count();
        let suffixes = longest_chains(graph.forward(), graph.reverse(), node_count);
        let mut prefixes = longest_chains(graph.reverse(), graph.forward(), node_count);
        for chains in &mut prefixes {
            for chain in chains.iter_mut() {
                chain.reverse();
            }
        }
        Self { suffixes, prefixes }
    }

    /// Longest chains starting at `node`
    pub fn suffixes(&self, node: ServiceId) -> &[Chain] {
        self.suffixes
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Longest chains ending at `node`
    pub fn prefixes(&self, node: ServiceId) -> &[Chain] {
        self.prefixes
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every longest chain that contains the edge `caller → responder`
    pub fn chains_through(&self, caller: ServiceId, responder: ServiceId) -> Vec<Chain> {
        let prefixes = self.prefixes(caller);
        let suffixes = self.suffixes(responder);
        let mut chains = Vec::with_capacity(prefixes.len() * suffixes.len());
        for prefix in prefixes {
            for suffix in suffixes {
                let mut chain = Vec::with_capacity(prefix.len() + suffix.len());
                chain.extend_from_slice(prefix);
                chain.extend_from_slice(suffix);
                chains.push(chain);
            }
        }
        chains
    }
}

/// Longest chains starting at every node of `graph`
///
/// `reverse` must be the transpose of `graph`.
pub fn longest_chains(graph: &Adjacency, reverse: &Adjacency, node_count: usize) -> Vec<Vec<Chain>> {
    let mut remaining = graph.out_degrees();
    remaining.resize(node_count, 0);
    let mut chains: Vec<Vec<Chain>> = vec![Vec::new(); node_count];

    let mut queue: VecDeque<ServiceId> = (0..node_count as u32)
        .map(ServiceId)
        .filter(|node| remaining[node.index()] == 0)
        .collect();
    let mut finalized = 0usize;

    while let Some(node) = queue.pop_front() {
        finalized += 1;
        chains[node.index()] = extend_best(graph, node, &chains);

        for pred in reverse.successors(node) {
            let left = &mut remaining[pred.index()];
            *left -= 1;
            if *left == 0 {
                queue.push_back(pred);
            }
        }
    }

    if finalized < node_count {
        tracing::warn!(
            cyclic = node_count - finalized,
            "call graph has cycles; nodes on them get no longest path"
        );
    }
    chains
}

/// `node` prepended to every maximal-length chain of its successors
fn extend_best(graph: &Adjacency, node: ServiceId, chains: &[Vec<Chain>]) -> Vec<Chain> {
    let best = graph
        .successors(node)
        .filter_map(|succ| chains[succ.index()].first().map(Vec::len))
        .max();
    let Some(best) = best else {
        return vec![vec![node]];
    };

    let mut extended = Vec::new();
    for succ in graph.successors(node) {
        for chain in &chains[succ.index()] {
            if chain.len() != best {
                continue;
            }
            let mut longer = Vec::with_capacity(best + 1);
            longer.push(node);
            longer.extend_from_slice(chain);
            extended.push(longer);
        }
    }
    extended
}

/// Renders annotated path strings for every (edge, minute, metric)
///
/// A path string looks like `A->B->C|12ms,30ms`: the chain, then one
/// annotation per hop. A hop with no calls that minute shows `-1ms` or
/// `-1%`.
pub struct PathMaterializer<'a> {
    engine: &'a LongestPathEngine,
    topology: &'a Topology,
    service_pairs: &'a mut ServicePairStore,
    labels: &'a [String],
}

impl<'a> PathMaterializer<'a> {
    pub fn new(
        engine: &'a LongestPathEngine,
        topology: &'a Topology,
        service_pairs: &'a mut ServicePairStore,
        labels: &'a [String],
    ) -> Self {
        Self {
            engine,
            topology,
            service_pairs,
            labels,
        }
    }

    /// Key/answer entries for the given edges, skipping empty answers
    pub fn materialize(&mut self, edges: &[(ServiceId, ServiceId)]) -> Vec<(PathKey, Vec<String>)> {
        let (engine, topology, labels) = (self.engine, self.topology, self.labels);
        let services = topology.services();
        let mut entries = Vec::new();

        for &(caller, responder) in edges {
            let chains = engine.chains_through(caller, responder);
            if chains.is_empty() {
                continue;
            }
            let rendered: Vec<String> = chains
                .iter()
                .map(|chain| {
                    chain
                        .iter()
                        .map(|&id| services.name(id))
                        .collect::<Vec<_>>()
                        .join("->")
                })
                .collect();

            for (minute, label) in labels.iter().enumerate() {
                for metric in Metric::ALL {
                    let paths = chains
                        .iter()
                        .zip(&rendered)
                        .map(|(chain, text)| {
                            format!("{}|{}", text, self.annotate(chain, minute, metric))
                        })
                        .collect();
                    entries.push((
                        PathKey::new(
                            services.name(caller),
                            services.name(responder),
                            label,
                            metric,
                        ),
                        paths,
                    ));
                }
            }
        }

        tracing::debug!(edges = edges.len(), keys = entries.len(), "longest paths materialized");
        entries
    }

    fn annotate(&mut self, chain: &[ServiceId], minute: usize, metric: Metric) -> String {
        chain
            .windows(2)
            .map(|hop| {
                let stats = self.service_pairs.hop_stats(hop[0], hop[1], minute);
                match (metric, stats) {
                    (Metric::P99, Some(stats)) => format!("{}ms", stats.p99),
                    (Metric::P99, None) => "-1ms".to_string(),
                    (Metric::SuccessRate, Some(stats)) => format_rate(stats.success_rate),
                    (Metric::SuccessRate, None) => "-1%".to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
