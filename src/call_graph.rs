//! Service call graph
//!
//! A directed graph over service nodes where an edge `caller → responder`
//! exists if at least one call between the two services was observed. Many IP
//! pairs share one service pair; they contribute a single edge.
//!
//! # Representation
//!
//! Forward-star adjacency: every edge lives in one arena, each node stores the
//! arena index of its most recently added edge, and each edge links to the
//! previous edge of the same source node.
//!
//! ```text
//! edges: [ (A→B, next: -), (A→C, next: 0), (B→D, next: -), (C→D, next: -) ]
//! head:  A: 1   B: 2   C: 3   D: -
//! ```
//!
//! The reverse graph is maintained alongside so that the longest-path engine
//! can walk predecessors without rebuilding anything.

use fnv::FnvHashSet;

/// Dense service id, assigned by the service interner in first-seen order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub u32);

impl ServiceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: ServiceId,
    to: ServiceId,
    next: Option<u32>,
}

/// Forward-star adjacency over dense node ids
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    edges: Vec<Edge>,
    head: Vec<Option<u32>>,
    out_degree: Vec<u32>,
}

impl Adjacency {
    fn ensure_node(&mut self, node: ServiceId) {
        if node.index() >= self.head.len() {
            self.head.resize(node.index() + 1, None);
            self.out_degree.resize(node.index() + 1, 0);
        }
    }

    fn push(&mut self, from: ServiceId, to: ServiceId) {
        self.ensure_node(from);
        self.ensure_node(to);
        let id = self.edges.len() as u32;
        self.edges.push(Edge {
            from,
            to,
            next: self.head[from.index()],
        });
        self.head[from.index()] = Some(id);
        self.out_degree[from.index()] += 1;
    }

    /// Number of outgoing edges of `node` (0 for unknown nodes)
    pub fn out_degree(&self, node: ServiceId) -> u32 {
        self.out_degree.get(node.index()).copied().unwrap_or(0)
    }

    /// Copy of the whole out-degree table, indexed by node id
    pub fn out_degrees(&self) -> Vec<u32> {
        self.out_degree.clone()
    }

    /// Direct successors of `node`, most recently added first
    pub fn successors(&self, node: ServiceId) -> Successors<'_> {
        Successors {
            adjacency: self,
            cursor: self.head.get(node.index()).copied().flatten(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.head.len()
    }
}

/// Iterator over one node's edge chain
pub struct Successors<'a> {
    adjacency: &'a Adjacency,
    cursor: Option<u32>,
}

impl Iterator for Successors<'_> {
    type Item = ServiceId;

    fn next(&mut self) -> Option<ServiceId> {
        let edge = self.adjacency.edges[self.cursor? as usize];
        self.cursor = edge.next;
        Some(edge.to)
    }
}

/// Edge-deduplicated call graph plus its reverse
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    forward: Adjacency,
    reverse: Adjacency,
    seen: FnvHashSet<(ServiceId, ServiceId)>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` known to the graph even if it has no edges yet
    pub fn add_node(&mut self, node: ServiceId) {
        self.forward.ensure_node(node);
        self.reverse.ensure_node(node);
    }

    /// Add `caller → responder`; returns false if the edge already existed
    pub fn add_edge(&mut self, caller: ServiceId, responder: ServiceId) -> bool {
        if !self.seen.insert((caller, responder)) {
            return false;
        }
        self.forward.push(caller, responder);
        self.reverse.push(responder, caller);
        true
    }

    pub fn contains_edge(&self, caller: ServiceId, responder: ServiceId) -> bool {
        self.seen.contains(&(caller, responder))
    }

    pub fn forward(&self) -> &Adjacency {
        &self.forward
    }

    pub fn reverse(&self) -> &Adjacency {
        &self.reverse
    }

    pub fn node_count(&self) -> usize {
        self.forward.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.edges.len()
    }

    /// All edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (ServiceId, ServiceId)> + '_ {
        self.forward.edges.iter().map(|e| (e.from, e.to))
    }
}
