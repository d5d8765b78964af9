//! Projects a well-formed [`Cfg`] onto one role's [`Cfsm`] (§4.3).
//!
//! The algorithm is a breadth-first traversal from `Initial`, mapping each
//! visited CFG node to a CFSM state and emitting the role's view of that
//! node's action (`Send`/`Receive`/`Tau`/...). Branch points are handled by
//! giving every branch of a `Branch` node the *same* predecessor CFSM state,
//! so non-deciding roles naturally converge back to one state at the
//! matching `Merge` node — this is what realizes the merge operator for
//! roles whose continuations are already structurally identical; roles
//! whose continuations genuinely diverge are caught up front by the
//! mergeability check (§4.2 P0), which walks each branch independently and
//! compares the role's observable effects (see [`branch_effects`]).

use crate::ast::{PayloadType, Role};
use crate::cfg::{Action, Cfg, NodeId, NodeKind};
use crate::cfsm::{Cfsm, CfsmAction, StateId};
use crate::error::ProjectionError;
use crate::verify::{self, Priority};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// What a single CFG node's action looks like from one role's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RoleEffect {
    Tau,
    Sends(Vec<(Role, String, Option<PayloadType>)>),
    Receive(Role, String, Option<PayloadType>),
    Call(String, Vec<Role>),
    Create(String, Option<String>),
    Invite(Role),
    InviteReceive(Role),
}

pub(crate) fn role_effect(action: &Action, role: &Role) -> RoleEffect {
    match action {
        Action::Message(m) => {
            if &m.from == role {
                RoleEffect::Sends(
                    m.to.iter()
                        .map(|r| (r.clone(), m.label.clone(), m.payload_type.clone()))
                        .collect(),
                )
            } else if m.to.contains(role) {
                RoleEffect::Receive(m.from.clone(), m.label.clone(), m.payload_type.clone())
            } else {
                RoleEffect::Tau
            }
        }
        Action::SubprotocolCall(c) => {
            if &c.caller == role || c.arguments.contains(role) {
                RoleEffect::Call(c.protocol.clone(), c.arguments.clone())
            } else {
                RoleEffect::Tau
            }
        }
        Action::CreateParticipants(c) => {
            if &c.creator == role {
                RoleEffect::Create(c.role_type.clone(), c.instance_name.clone())
            } else {
                RoleEffect::Tau
            }
        }
        Action::Invitation(i) => {
            if &i.inviter == role {
                RoleEffect::Invite(i.invitee.clone())
            } else if &i.invitee == role {
                RoleEffect::InviteReceive(i.inviter.clone())
            } else {
                RoleEffect::Tau
            }
        }
        Action::UpdatableRecursion(_) => RoleEffect::Tau,
    }
}

/// The ordered sequence of non-tau effects a role observes while the CFG's
/// control passes through `nodes` (sorted by node id, which is a stable
/// creation-order proxy for "program order" within the builder's output),
/// used to compare branch continuations for the §4.2 mergeability check.
pub(crate) fn branch_effects(
    cfg: &Cfg,
    nodes: &std::collections::BTreeSet<NodeId>,
    role: &Role,
) -> Vec<RoleEffect> {
    let mut out = Vec::new();
    for &id in nodes {
        if let Some(NodeKind::Action(a)) = cfg.node_kind(id) {
            let effect = role_effect(a, role);
            if effect != RoleEffect::Tau {
                out.push(effect);
            }
        }
    }
    out
}

/// Roles directly touched by the distinguishing first message of a branch
/// (its sender and receivers), used to scope the §4.2 mergeability check to
/// the roles that must have *identical* continuations.
fn non_participating_roles(cfg: &Cfg, branch_entry: NodeId, roles: &[Role]) -> Vec<Role> {
    let mut participants = Vec::new();
    if let Some(first) = first_message(cfg, branch_entry) {
        participants.push(first.from.clone());
        participants.extend(first.to.iter().cloned());
    }
    roles
        .iter()
        .filter(|r| !participants.contains(r))
        .cloned()
        .collect()
}

pub(crate) fn first_message<'a>(
    cfg: &'a Cfg,
    mut node: NodeId,
) -> Option<&'a crate::cfg::MessageAction> {
    loop {
        match cfg.node_kind(node)? {
            NodeKind::Action(Action::Message(m)) => return Some(m),
            NodeKind::Action(_) | NodeKind::Recursive { .. } => {
                let succs = cfg.successors(node, false);
                node = *succs.first()?;
                if succs.len() != 1 {
                    return None;
                }
            }
            _ => return None,
        }
    }
}

/// Checks the §4.2 P0 "choice mergeability" property for one `Branch` node:
/// every role not sending/receiving the distinguishing first message must
/// observe an identical effect sequence across all branches.
pub(crate) fn check_mergeability(
    cfg: &Cfg,
    branch_node: NodeId,
    merge_node: NodeId,
) -> Result<(), String> {
    let branch_entries = cfg.successors(branch_node, false);
    if branch_entries.is_empty() {
        return Ok(());
    }
    let mut non_participants: Option<Vec<Role>> = None;
    let mut traces: HashMap<Role, Vec<Vec<RoleEffect>>> = HashMap::new();

    for &entry in &branch_entries {
        let np = non_participating_roles(cfg, entry, &cfg.roles);
        non_participants = Some(np.clone());
        let subgraph = crate::cfg::utils::extract_subgraph(cfg, entry, merge_node);
        for role in &np {
            let effects = branch_effects(cfg, &subgraph, role);
            traces.entry(role.clone()).or_default().push(effects);
        }
    }

    if let Some(roles) = non_participants {
        for role in roles {
            if let Some(seqs) = traces.get(&role) {
                if let Some(first) = seqs.first() {
                    for other in &seqs[1..] {
                        if other != first {
                            return Err(format!(
                                "role '{role}' has divergent continuations across branches"
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Project a well-formed [`Cfg`] onto `role`'s [`Cfsm`] (§4.3).
#[tracing::instrument(skip(cfg), fields(role = %role, protocol = %cfg.protocol_name))]
pub fn project(cfg: &Cfg, role: &Role) -> Result<Cfsm, ProjectionError> {
    if !cfg.roles.contains(role) {
        return Err(ProjectionError::UnknownRole(role.0.clone()));
    }

    let report = verify::verify(cfg);
    for check in report.checks.iter().filter(|c| c.priority == Priority::P0) {
        if !check.pass {
            return Err(ProjectionError::P0Violation {
                role: role.0.clone(),
                check: check.name.to_string(),
            });
        }
    }

    // Mergeability is re-checked per role here only to surface the role name
    // in the error; the pass/fail decision was already made by `verify`.
    for id in cfg.node_ids() {
        if let Some(NodeKind::Branch { .. }) = cfg.node_kind(id) {
            if let Some(merge) = find_merge_for_branch(cfg, id) {
                if let Err(reason) = check_mergeability(cfg, id, merge) {
                    if reason.contains(&role.0) {
                        return Err(ProjectionError::MergeFailure {
                            role: role.0.clone(),
                            node: id,
                            reason,
                        });
                    }
                }
            }
        }
    }

    let mut cfsm = Cfsm::new(role.clone(), StateId(0));
    let mut node_to_state: HashMap<NodeId, StateId> = HashMap::new();
    let mut next_state = 1u32;
    node_to_state.insert(cfg.initial(), StateId(0));

    let mut worklist = VecDeque::new();
    worklist.push_back(cfg.initial());
    let mut visited = std::collections::HashSet::new();
    visited.insert(cfg.initial());

    while let Some(node) = worklist.pop_front() {
        let from_state = node_to_state[&node];
        if cfg.is_terminal(node) {
            cfsm.mark_terminal(from_state);
        }

        for succ in cfg.successors(node, true) {
            let to_state = *node_to_state.entry(succ).or_insert_with(|| {
                let s = StateId(next_state);
                next_state += 1;
                s
            });
            cfsm.add_state(to_state);

            let action = cfsm_action_for(cfg, node, succ, role)?;
            for a in action {
                cfsm.add_transition(from_state, to_state, a);
            }

            if visited.insert(succ) {
                worklist.push_back(succ);
            }
        }
    }

    Ok(cfsm)
}

fn find_merge_for_branch(cfg: &Cfg, branch: NodeId) -> Option<NodeId> {
    for &entry in &cfg.successors(branch, false) {
        let reach = crate::cfg::utils::reachable_from(cfg, entry, false);
        for n in reach {
            if matches!(cfg.node_kind(n), Some(NodeKind::Merge)) {
                return Some(n);
            }
        }
    }
    None
}

fn cfsm_action_for(
    cfg: &Cfg,
    from: NodeId,
    _to: NodeId,
    role: &Role,
) -> Result<Vec<CfsmAction>, ProjectionError> {
    match cfg.node_kind(from) {
        Some(NodeKind::Action(a)) => Ok(match role_effect(a, role) {
            RoleEffect::Tau => vec![CfsmAction::Tau],
            RoleEffect::Sends(sends) => sends
                .into_iter()
                .map(|(to, label, payload)| CfsmAction::Send { to, label, payload })
                .collect(),
            RoleEffect::Receive(from_role, label, payload) => vec![CfsmAction::Receive {
                from: from_role,
                label,
                payload,
            }],
            RoleEffect::Call(protocol, participants) => {
                vec![CfsmAction::SubprotocolCall {
                    protocol,
                    participants,
                }]
            }
            RoleEffect::Create(role_type, instance_name) => vec![CfsmAction::Create {
                role_type,
                instance_name,
            }],
            RoleEffect::Invite(invitee) => vec![CfsmAction::Invite { invitee }],
            RoleEffect::InviteReceive(inviter) => vec![CfsmAction::InviteReceive { inviter }],
        }),
        Some(NodeKind::Branch { at }) if at == role => Ok(vec![CfsmAction::Choice]),
        _ => Ok(vec![CfsmAction::Tau]),
    }
}

/// Project every declared role, collecting per-role projection errors
/// instead of failing the whole call (§6.1 `projectAll`).
pub fn project_all(cfg: &Cfg) -> (BTreeMap<Role, Cfsm>, Vec<ProjectionError>) {
    let mut cfsms = BTreeMap::new();
    let mut errors = Vec::new();
    for role in &cfg.roles {
        match project(cfg, role) {
            Ok(c) => {
                cfsms.insert(role.clone(), c);
            }
            Err(e) => errors.push(e),
        }
    }
    (cfsms, errors)
}

/// Like [`project`], but additionally runs the §4.8 minimization pass when
/// `config.minimize` is set. Minimization never changes projection
/// semantics, only the resulting CFSM's state count.
pub fn project_with_config(
    cfg: &Cfg,
    role: &Role,
    config: &crate::config::ProjectionConfig,
) -> Result<Cfsm, ProjectionError> {
    let cfsm = project(cfg, role)?;
    Ok(if config.minimize { minimize(&cfsm) } else { cfsm })
}

pub fn project_all_with_config(
    cfg: &Cfg,
    config: &crate::config::ProjectionConfig,
) -> (BTreeMap<Role, Cfsm>, Vec<ProjectionError>) {
    let (cfsms, errors) = project_all(cfg);
    let cfsms = if config.minimize {
        cfsms.into_iter().map(|(r, c)| (r, minimize(&c))).collect()
    } else {
        cfsms
    };
    (cfsms, errors)
}

/// Moore-style partition refinement: merge states with identical
/// termination status and identical (action, target-partition) transition
/// signatures, repeating until the partition stops changing.
pub fn minimize(cfsm: &Cfsm) -> Cfsm {
    let states: Vec<StateId> = cfsm.states.iter().copied().collect();
    let mut partition: HashMap<StateId, usize> = states
        .iter()
        .map(|&s| (s, if cfsm.is_terminal(s) { 1 } else { 0 }))
        .collect();

    loop {
        let mut signatures: HashMap<StateId, (usize, Vec<(String, usize)>)> = HashMap::new();
        for &s in &states {
            let mut sig: Vec<(String, usize)> = cfsm
                .outgoing(s)
                .map(|t| (format!("{:?}", t.action), partition[&t.to]))
                .collect();
            sig.sort();
            signatures.insert(s, (partition[&s], sig));
        }

        let mut sig_to_id: BTreeMap<(usize, Vec<(String, usize)>), usize> = BTreeMap::new();
        let mut new_partition = HashMap::new();
        for &s in &states {
            let sig = signatures[&s].clone();
            let next_id = sig_to_id.len();
            let id = *sig_to_id.entry(sig).or_insert(next_id);
            new_partition.insert(s, id);
        }

        if new_partition == partition {
            break;
        }
        partition = new_partition;
    }

    let mut min = Cfsm::new(cfsm.role.clone(), StateId(partition[&cfsm.initial_state] as u32));
    let mut seen_edges = std::collections::HashSet::new();
    for &s in &states {
        let pid = partition[&s] as u32;
        if cfsm.is_terminal(s) {
            min.mark_terminal(StateId(pid));
        }
        for t in cfsm.outgoing(s) {
            let to_pid = partition[&t.to] as u32;
            let key = (pid, to_pid, format!("{:?}", t.action));
            if seen_edges.insert(key) {
                min.add_transition(StateId(pid), StateId(to_pid), t.action.clone());
            }
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Protocol, Receivers, Statement};
    use crate::cfg::builder::build_cfg;

    fn role(s: &str) -> Role {
        Role::new(s)
    }

    fn msg(from: &str, to: &str, label: &str) -> Statement {
        Statement::Message {
            from: role(from),
            to: Receivers::One(role(to)),
            label: label.to_string(),
            payload_type: None,
            span: None,
        }
    }

    #[test]
    fn role_effect_distinguishes_sender_receiver_and_bystander() {
        let action = Action::Message(crate::cfg::MessageAction {
            from: role("A"),
            to: vec![role("B")],
            label: "ping".to_string(),
            payload_type: None,
        });
        assert!(matches!(role_effect(&action, &role("A")), RoleEffect::Sends(_)));
        assert!(matches!(role_effect(&action, &role("B")), RoleEffect::Receive(..)));
        assert_eq!(role_effect(&action, &role("C")), RoleEffect::Tau);
    }

    #[test]
    fn projecting_an_undeclared_role_fails() {
        let proto = Protocol {
            name: "p".to_string(),
            roles: vec![role("A"), role("B")],
            dynamic_roles: Vec::new(),
            body: msg("A", "B", "ping"),
        };
        let cfg = build_cfg(&proto).unwrap();
        let err = project(&cfg, &role("Ghost")).unwrap_err();
        assert!(matches!(err, ProjectionError::UnknownRole(_)));
    }

    #[test]
    fn every_branch_produces_a_choice_marker_for_the_deciding_role() {
        let proto = Protocol {
            name: "p".to_string(),
            roles: vec![role("A"), role("B")],
            dynamic_roles: Vec::new(),
            body: Statement::Choice {
                at: role("A"),
                branches: vec![msg("A", "B", "yes"), msg("A", "B", "no")],
                span: None,
            },
        };
        let cfg = build_cfg(&proto).unwrap();
        let cfsm = project(&cfg, &role("A")).unwrap();
        assert!(cfsm
            .transitions
            .iter()
            .any(|t| matches!(t.action, CfsmAction::Choice)));
    }

    #[test]
    fn minimize_never_increases_the_state_count() {
        let proto = Protocol {
            name: "p".to_string(),
            roles: vec![role("A"), role("B")],
            dynamic_roles: Vec::new(),
            body: Statement::Sequence(vec![msg("A", "B", "ping"), msg("B", "A", "pong")]),
        };
        let cfg = build_cfg(&proto).unwrap();
        let cfsm = project(&cfg, &role("A")).unwrap();
        let minimized = minimize(&cfsm);
        assert!(minimized.states.len() <= cfsm.states.len());
        assert_eq!(minimized.is_terminal(minimized.initial_state), cfsm.is_terminal(cfsm.initial_state));
    }
}
