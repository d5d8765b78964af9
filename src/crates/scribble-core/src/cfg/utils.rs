//! CFG utilities: reachability, SCC, dominators, path enumeration, and
//! subgraph extraction (§2, §4.2 "Algorithmic notes").
//!
//! Traversals here are iterative (explicit worklists/stacks), never
//! recursive, per `spec.md` §5 ("graph traversals must be implemented
//! iteratively... protocols up to thousands of nodes are expected").

use crate::cfg::{Cfg, EdgeType, NodeId};
use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// All nodes reachable from `start` via a BFS worklist, optionally
/// following `continue` back-edges.
pub fn reachable_from(cfg: &Cfg, start: NodeId, include_continue: bool) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut worklist = VecDeque::new();
    worklist.push_back(start);
    seen.insert(start);
    while let Some(n) = worklist.pop_front() {
        for succ in cfg.successors(n, include_continue) {
            if seen.insert(succ) {
                worklist.push_back(succ);
            }
        }
    }
    seen
}

/// The set of nodes that can reach *some* terminal node, computed by a
/// reverse BFS seeded at every terminal.
pub fn nodes_reaching_terminal(cfg: &Cfg, include_continue: bool) -> BTreeSet<NodeId> {
    let mut seen: BTreeSet<NodeId> = cfg.terminals().collect();
    let mut worklist: VecDeque<NodeId> = seen.iter().copied().collect();
    while let Some(n) = worklist.pop_front() {
        for pred in cfg.predecessors(n, include_continue) {
            if seen.insert(pred) {
                worklist.push_back(pred);
            }
        }
    }
    seen
}

/// Strongly connected components of the graph restricted to
/// `include_continue`, computed with an iterative Tarjan's algorithm
/// (explicit stack, no recursion). Returned components are in no
/// particular order; singleton components with no self-loop are not cycles.
pub fn tarjan_scc(cfg: &Cfg, include_continue: bool) -> Vec<Vec<NodeId>> {
    struct State {
        index: HashMap<NodeId, usize>,
        lowlink: HashMap<NodeId, usize>,
        on_stack: HashSet<NodeId>,
        stack: Vec<NodeId>,
        counter: usize,
        components: Vec<Vec<NodeId>>,
    }

    // Each explicit-stack frame tracks which successor to visit next so the
    // whole walk is iterative.
    enum Frame {
        Enter(NodeId),
        Exit(NodeId),
    }

    let mut state = State {
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        counter: 0,
        components: Vec::new(),
    };

    for start in cfg.node_ids() {
        if state.index.contains_key(&start) {
            continue;
        }
        let mut work: Vec<Frame> = vec![Frame::Enter(start)];
        let mut child_of: HashMap<NodeId, NodeId> = HashMap::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(v) => {
                    if state.index.contains_key(&v) {
                        continue;
                    }
                    state.index.insert(v, state.counter);
                    state.lowlink.insert(v, state.counter);
                    state.counter += 1;
                    state.stack.push(v);
                    state.on_stack.insert(v);

                    work.push(Frame::Exit(v));
                    for w in cfg.successors(v, include_continue) {
                        if !state.index.contains_key(&w) {
                            child_of.insert(w, v);
                            work.push(Frame::Enter(w));
                        } else if state.on_stack.contains(&w) {
                            let wi = state.index[&w];
                            let vl = state.lowlink[&v];
                            state.lowlink.insert(v, vl.min(wi));
                        }
                    }
                }
                Frame::Exit(v) => {
                    for w in cfg.successors(v, include_continue) {
                        if let Some(&parent) = child_of.get(&w) {
                            if parent == v && state.lowlink.contains_key(&w) {
                                let wl = state.lowlink[&w];
                                let vl = state.lowlink[&v];
                                state.lowlink.insert(v, vl.min(wl));
                            }
                        }
                    }
                    if state.lowlink[&v] == state.index[&v] {
                        let mut component = Vec::new();
                        loop {
                            let w = state.stack.pop().unwrap();
                            state.on_stack.remove(&w);
                            component.push(w);
                            if w == v {
                                break;
                            }
                        }
                        state.components.push(component);
                    }
                }
            }
        }
    }

    state.components
}

/// Non-trivial SCCs (size > 1, or a single node with a self-loop) — the
/// cycles the deadlock check (§4.2 P1) inspects.
pub fn nontrivial_sccs(cfg: &Cfg, include_continue: bool) -> Vec<Vec<NodeId>> {
    tarjan_scc(cfg, include_continue)
        .into_iter()
        .filter(|comp| {
            comp.len() > 1
                || comp
                    .first()
                    .map(|&n| cfg.successors(n, include_continue).contains(&n))
                    .unwrap_or(false)
        })
        .collect()
}

fn filtered_digraph(
    cfg: &Cfg,
    include_continue: bool,
) -> (DiGraph<(), ()>, HashMap<NodeId, NodeIndex>, HashMap<NodeIndex, NodeId>) {
    let mut g = DiGraph::new();
    let mut to_idx = HashMap::new();
    let mut to_id = HashMap::new();
    for id in cfg.node_ids() {
        let idx = g.add_node(());
        to_idx.insert(id, idx);
        to_id.insert(idx, id);
    }
    for eid in cfg.edge_ids() {
        if !include_continue && cfg.edge_type(eid) == Some(EdgeType::Continue) {
            continue;
        }
        if let Some((from, to)) = cfg.edge_endpoints(eid) {
            g.add_edge(to_idx[&from], to_idx[&to], ());
        }
    }
    (g, to_idx, to_id)
}

/// Immediate-dominator tree of the non-continue graph, rooted at `root`
/// (§3.2 invariant 4, §4.2 "Algorithmic notes"). Built with `petgraph`'s
/// Lengauer-Tarjan style dominator computation.
pub fn dominators_from(cfg: &Cfg, root: NodeId) -> HashMap<NodeId, NodeId> {
    let (g, to_idx, to_id) = filtered_digraph(cfg, false);
    let Some(&root_idx) = to_idx.get(&root) else {
        return HashMap::new();
    };
    let doms: Dominators<NodeIndex> = dominators::simple_fast(&g, root_idx);
    let mut out = HashMap::new();
    for &idx in to_idx.values() {
        if let Some(idom) = doms.immediate_dominator(idx) {
            out.insert(to_id[&idx], to_id[&idom]);
        }
    }
    out
}

/// Post-dominator tree: the immediate-dominator tree of the reversed
/// non-continue graph from a virtual sink wired to every terminal.
pub fn post_dominators(cfg: &Cfg) -> HashMap<NodeId, NodeId> {
    let (mut g, to_idx, to_id) = filtered_digraph(cfg, false);
    let sink = g.add_node(());
    for t in cfg.terminals() {
        if let Some(&idx) = to_idx.get(&t) {
            g.add_edge(idx, sink, ());
        }
    }
    // `simple_fast` wants the dominance root first, so the reversal is
    // materialized explicitly rather than adapted on the fly.
    let mut rg = DiGraph::new();
    for _ in g.node_indices() {
        rg.add_node(());
    }
    for e in g.edge_indices() {
        let (a, b) = g.edge_endpoints(e).unwrap();
        rg.add_edge(b, a, ());
    }
    let doms: Dominators<NodeIndex> = dominators::simple_fast(&rg, sink);
    let mut out = HashMap::new();
    for (&id, &idx) in &to_idx {
        if let Some(ipdom_idx) = doms.immediate_dominator(idx) {
            if ipdom_idx != sink {
                out.insert(id, to_id[&ipdom_idx]);
            }
        }
    }
    out
}

/// Extract an independent [`Cfg`] containing exactly the nodes reachable
/// from `from` without passing through `boundary` (exclusive), used for
/// recursion-body / update-body extraction (§4.5 Def. 14 steps 2-3) and for
/// fork/join diamond subgraph checks (§4.2 P1).
pub fn extract_subgraph(cfg: &Cfg, from: NodeId, boundary: NodeId) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut worklist = VecDeque::new();
    if from != boundary {
        worklist.push_back(from);
        seen.insert(from);
    }
    while let Some(n) = worklist.pop_front() {
        for succ in cfg.successors(n, false) {
            if succ == boundary {
                continue;
            }
            if seen.insert(succ) {
                worklist.push_back(succ);
            }
        }
    }
    seen
}

/// Enumerate all simple paths (as node-id sequences) from `from` to any node
/// in `to`, up to `max_depth` edges, via iterative DFS. Used by bounded
/// trace enumeration (§4.6).
pub fn enumerate_paths(
    cfg: &Cfg,
    from: NodeId,
    to: &BTreeSet<NodeId>,
    max_depth: usize,
) -> Vec<Vec<NodeId>> {
    let mut results = Vec::new();
    let mut stack: Vec<(NodeId, Vec<NodeId>)> = vec![(from, vec![from])];
    while let Some((node, path)) = stack.pop() {
        if to.contains(&node) {
            results.push(path.clone());
        }
        if path.len() > max_depth {
            continue;
        }
        for succ in cfg.successors(node, true) {
            if path.len() <= max_depth {
                let mut next = path.clone();
                next.push(succ);
                stack.push((succ, next));
            }
        }
    }
    results
}
