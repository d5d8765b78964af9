//! The individual §4.2 well-formedness checks, one function per row of the
//! P0-P3 table.

use crate::ast::Role;
use crate::cfg::utils::{self, dominators_from, post_dominators};
use crate::cfg::{Action, Cfg, EdgeType, NodeId, NodeKind};
use crate::error::VerificationError;
use std::collections::{BTreeSet, HashMap, HashSet};

/// P0: every declared role must appear as sender or receiver of at least one
/// message, or as a subprotocol caller/argument, creator, or invitation
/// participant.
pub(super) fn check_connectedness(cfg: &Cfg) -> Vec<VerificationError> {
    let mut touched: HashSet<&Role> = HashSet::new();
    for id in cfg.node_ids() {
        if let Some(NodeKind::Action(a)) = cfg.node_kind(id) {
            match a {
                Action::Message(m) => {
                    touched.insert(&m.from);
                    touched.extend(m.to.iter());
                }
                Action::SubprotocolCall(c) => {
                    touched.insert(&c.caller);
                    touched.extend(c.arguments.iter());
                }
                Action::CreateParticipants(c) => {
                    touched.insert(&c.creator);
                }
                Action::Invitation(i) => {
                    touched.insert(&i.inviter);
                    touched.insert(&i.invitee);
                }
                Action::UpdatableRecursion(_) => {}
            }
        }
        if let Some(NodeKind::Branch { at }) = cfg.node_kind(id) {
            touched.insert(at);
        }
    }
    let orphans: Vec<String> = cfg
        .roles
        .iter()
        .filter(|r| !touched.contains(r))
        .map(|r| r.0.clone())
        .collect();
    if orphans.is_empty() {
        Vec::new()
    } else {
        vec![VerificationError::Disconnected(orphans)]
    }
}

/// P0: at every `Branch` node, the first message label on each branch must
/// be unique.
pub(super) fn check_choice_determinism(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        if !matches!(cfg.node_kind(id), Some(NodeKind::Branch { .. })) {
            continue;
        }
        let mut seen: HashSet<String> = HashSet::new();
        for entry in cfg.successors(id, false) {
            if let Some(m) = crate::project::first_message(cfg, entry) {
                if !seen.insert(m.label.clone()) {
                    violations.push(VerificationError::NonDeterministicChoice {
                        branch: id,
                        label: m.label.clone(),
                    });
                }
            }
        }
    }
    violations
}

/// P0: roles not participating in a branch's distinguishing first message
/// must have identical continuations across every branch.
pub(super) fn check_choice_mergeability(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        if !matches!(cfg.node_kind(id), Some(NodeKind::Branch { .. })) {
            continue;
        }
        let Some(merge) = find_merge(cfg, id) else {
            continue;
        };
        if let Err(reason) = crate::project::check_mergeability(cfg, id, merge) {
            violations.push(VerificationError::UnmergeableChoice { branch: id, reason });
        }
    }
    violations
}

fn find_merge(cfg: &Cfg, branch: NodeId) -> Option<NodeId> {
    for entry in cfg.successors(branch, false) {
        for n in utils::reachable_from(cfg, entry, false) {
            if matches!(cfg.node_kind(n), Some(NodeKind::Merge)) {
                return Some(n);
            }
        }
    }
    None
}

/// P1: no cycle in the non-continue graph outside a `Recursive` node's own
/// body (a `continue` edge back to a `Recursive` head is the only sanctioned
/// cycle, and it is excluded from this graph by construction).
pub(super) fn check_deadlock_freedom(cfg: &Cfg) -> Vec<VerificationError> {
    utils::nontrivial_sccs(cfg, false)
        .into_iter()
        .map(|cycle| VerificationError::Deadlock { cycle })
        .collect()
}

/// P1: every node must be able to reach some terminal node.
pub(super) fn check_liveness(cfg: &Cfg) -> Vec<VerificationError> {
    let live = utils::nodes_reaching_terminal(cfg, true);
    cfg.node_ids()
        .filter(|id| !live.contains(id))
        .map(VerificationError::NotLive)
        .collect()
}

/// P1: the branches of a `Fork` must not form a cross-branch dependency
/// cycle once they are re-joined (detected as a cycle in the subgraph
/// between fork and join when branch-internal edges are merged with a
/// synthetic edge representing the implicit join-point rendezvous).
pub(super) fn check_parallel_deadlock(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        let Some(NodeKind::Fork { .. }) = cfg.node_kind(id) else {
            continue;
        };
        let Some(join) = matching_join(cfg, id) else {
            continue;
        };
        let region = utils::extract_subgraph(cfg, id, join);
        if region_has_internal_cycle(cfg, &region) {
            violations.push(VerificationError::ParallelDeadlock { fork: id });
        }
    }
    violations
}

fn region_has_internal_cycle(cfg: &Cfg, region: &BTreeSet<NodeId>) -> bool {
    for &n in region {
        for succ in cfg.successors(n, true) {
            if succ == n {
                return true;
            }
        }
    }
    false
}

/// P1: within a `Fork`/`Join` region, no two branches may both send to and
/// receive from the same channel (sender, receiver, label) pair — that
/// ordering is only well-defined sequentially.
pub(super) fn check_race_conditions(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        let Some(NodeKind::Fork { .. }) = cfg.node_kind(id) else {
            continue;
        };
        let Some(join) = matching_join(cfg, id) else {
            continue;
        };
        let mut channels: HashMap<(String, String), Vec<NodeId>> = HashMap::new();
        for branch_entry in cfg.successors(id, false) {
            let region = utils::extract_subgraph(cfg, branch_entry, join);
            for &n in &region {
                if let Some(NodeKind::Action(Action::Message(m))) = cfg.node_kind(n) {
                    for to in &m.to {
                        channels
                            .entry((m.from.0.clone(), to.0.clone()))
                            .or_default()
                            .push(n);
                    }
                }
            }
        }
        for ((from, to), nodes) in channels {
            if nodes.len() > 1 {
                violations.push(VerificationError::RaceCondition { fork: id, from, to });
            }
        }
    }
    violations
}

fn matching_join(cfg: &Cfg, fork: NodeId) -> Option<NodeId> {
    let NodeKind::Fork { parallel_id } = cfg.node_kind(fork)? else {
        return None;
    };
    cfg.node_ids().find(|&n| {
        matches!(cfg.node_kind(n), Some(NodeKind::Join { parallel_id: p }) if p == parallel_id)
    })
}

/// P1: every `continue` edge must point at a `Recursive` node that actually
/// dominates it (i.e. the continue is lexically inside the recursion it
/// names, never a jump into an unrelated region of the graph).
pub(super) fn check_continue_validity(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    let doms = dominators_from(cfg, cfg.initial());
    for id in cfg.node_ids() {
        for succ in cfg.successors(id, true) {
            let is_continue = cfg
                .outgoing(id, true)
                .into_iter()
                .any(|e| cfg.edge_type(e) == Some(EdgeType::Continue) && cfg.edge_endpoints(e) == Some((id, succ)));
            if !is_continue {
                continue;
            }
            let Some(NodeKind::Recursive { label }) = cfg.node_kind(succ) else {
                continue;
            };
            if !dominates(&doms, succ, id) {
                violations.push(VerificationError::InvalidContinue {
                    node: id,
                    label: label.clone(),
                });
            }
        }
    }
    violations
}

fn dominates(doms: &HashMap<NodeId, NodeId>, candidate: NodeId, mut node: NodeId) -> bool {
    if candidate == node {
        return true;
    }
    let mut guard = 0;
    while let Some(&idom) = doms.get(&node) {
        if idom == candidate {
            return true;
        }
        if idom == node || guard > doms.len() + 1 {
            return false;
        }
        node = idom;
        guard += 1;
    }
    false
}

/// P1: a recursion body must not cross a `Fork`/`Join` boundary (its head
/// and every `continue` targeting it must lie in the same parallel branch,
/// or both outside any parallel region).
pub(super) fn check_recursion_in_parallel(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        let Some(NodeKind::Recursive { label }) = cfg.node_kind(id) else {
            continue;
        };
        let head_region = enclosing_fork_join(cfg, id);
        for pred in cfg.predecessors(id, true) {
            let is_continue = cfg
                .incoming(id, true)
                .into_iter()
                .any(|e| cfg.edge_type(e) == Some(EdgeType::Continue) && cfg.edge_endpoints(e) == Some((pred, id)));
            if !is_continue {
                continue;
            }
            let continue_region = enclosing_fork_join(cfg, pred);
            if head_region != continue_region {
                if let Some((fork, join)) = head_region.or(continue_region) {
                    violations.push(VerificationError::RecursionInParallel {
                        label: label.clone(),
                        fork,
                        join,
                    });
                }
            }
        }
    }
    violations
}

fn enclosing_fork_join(cfg: &Cfg, node: NodeId) -> Option<(NodeId, NodeId)> {
    for id in cfg.node_ids() {
        let Some(NodeKind::Fork { .. }) = cfg.node_kind(id) else {
            continue;
        };
        let Some(join) = matching_join(cfg, id) else {
            continue;
        };
        let region = utils::extract_subgraph(cfg, id, join);
        if region.contains(&node) {
            return Some((id, join));
        }
    }
    None
}

/// P1: every `Fork` must have exactly one matching `Join` that
/// post-dominates all its branches.
pub(super) fn check_fork_join_structure(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    let post_doms = post_dominators(cfg);
    for id in cfg.node_ids() {
        let Some(NodeKind::Fork { parallel_id }) = cfg.node_kind(id) else {
            continue;
        };
        let joins: Vec<NodeId> = cfg
            .node_ids()
            .filter(|&n| {
                matches!(cfg.node_kind(n), Some(NodeKind::Join { parallel_id: p }) if p == parallel_id)
            })
            .collect();
        if joins.len() != 1 {
            violations.push(VerificationError::ForkJoinMismatch { fork: id });
            continue;
        }
        let join = joins[0];
        for branch_entry in cfg.successors(id, false) {
            if !dominates(&post_doms, join, branch_entry) {
                violations.push(VerificationError::ForkJoinMismatch { fork: id });
                break;
            }
        }
    }
    violations
}

/// P2 (hard error): a message whose sender and receiver set are the same
/// role.
pub(super) fn check_self_communication(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        if let Some(NodeKind::Action(Action::Message(m))) = cfg.node_kind(id) {
            if m.to.contains(&m.from) {
                violations.push(VerificationError::SelfCommunication(m.from.0.clone()));
            }
        }
    }
    violations
}

/// P2 (hard error): a `Choice` branch that is immediately `End` with no
/// distinguishing action is legal but an *empty* branch list is not — this
/// is already rejected by the builder (`BuildError::EmptyChoice`); here we
/// additionally flag a branch fragment with zero reachable action nodes.
pub(super) fn check_empty_branches(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        if !matches!(cfg.node_kind(id), Some(NodeKind::Branch { .. })) {
            continue;
        }
        let Some(merge) = find_merge(cfg, id) else {
            continue;
        };
        for entry in cfg.successors(id, false) {
            let region = utils::extract_subgraph(cfg, entry, merge);
            let has_action = region
                .iter()
                .any(|n| matches!(cfg.node_kind(*n), Some(NodeKind::Action(_))));
            if !has_action {
                violations.push(VerificationError::EmptyBranch(id));
            }
        }
    }
    violations
}

/// P2 (warning): a multicast message with more than one receiver. Not an
/// error — multicast is a legal construct (§3.1) — but flagged because it
/// distributes into several per-receiver CFSM transitions.
pub(super) fn check_multicast(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        if let Some(NodeKind::Action(Action::Message(m))) = cfg.node_kind(id) {
            if m.to.len() > 1 {
                violations.push(VerificationError::Multicast {
                    node: id,
                    count: m.to.len(),
                });
            }
        }
    }
    violations
}

/// P3 (advisory): every branch of a `Branch` node should actually reach its
/// paired `Merge` node (unreachable merges usually indicate a mislabeled
/// `continue`).
pub(super) fn check_merge_reachability(cfg: &Cfg) -> Vec<VerificationError> {
    let mut violations = Vec::new();
    for id in cfg.node_ids() {
        if !matches!(cfg.node_kind(id), Some(NodeKind::Branch { .. })) {
            continue;
        }
        let Some(merge) = find_merge(cfg, id) else {
            continue;
        };
        for entry in cfg.successors(id, false) {
            let reach = utils::reachable_from(cfg, entry, true);
            if !reach.contains(&merge) {
                violations.push(VerificationError::MergeUnreachable { branch: id });
                break;
            }
        }
    }
    violations
}
