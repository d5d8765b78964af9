//! The ♢ combining operator (§4.4): sequential composition of two
//! channel-disjoint CFGs, used both for inlining subprotocol calls and for
//! building the DMst 1-unfolding (§4.5) out of a recursion body and its
//! update body.
//!
//! `combine(g1, g2)` requires that no channel — identified by
//! `(sender, receiver, label)` — is used by both operands; two CFGs that
//! share a channel could not be told apart by any participant observing
//! messages on it, which breaks the argument that verifying the unfolding
//! stands in for verifying the whole (possibly infinite) unfolding sequence.

use crate::ast::Role;
use crate::cfg::{Action, Cfg, EdgeType, NodeId, NodeKind};
use crate::error::{Channel, CombineError};
use std::collections::{HashMap, HashSet};

fn channels_of(cfg: &Cfg) -> HashSet<Channel> {
    let mut out = HashSet::new();
    for id in cfg.node_ids() {
        if let Some(NodeKind::Action(Action::Message(m))) = cfg.node_kind(id) {
            for to in &m.to {
                out.insert(Channel {
                    from: m.from.0.clone(),
                    to: to.0.clone(),
                    label: m.label.clone(),
                });
            }
        }
    }
    out
}

/// Copy every node and edge of `src` into `dest`, returning the
/// src-node-id -> dest-node-id mapping.
fn copy_into(dest: &mut Cfg, src: &Cfg) -> HashMap<NodeId, NodeId> {
    let mut mapping = HashMap::new();
    for id in src.node_ids() {
        let data = src.node(id).expect("node id came from this cfg");
        let new_id = dest.add_node(data.kind.clone(), data.span);
        mapping.insert(id, new_id);
    }
    for eid in src.edge_ids() {
        let (from, to) = src.edge_endpoints(eid).expect("edge id came from this cfg");
        let edge_type = src.edge_type(eid).expect("edge id came from this cfg");
        dest.add_edge(mapping[&from], mapping[&to], edge_type);
    }
    mapping
}

/// Sequentially compose `g1` then `g2`: every terminal of `g1` gets a
/// `Sequence` edge to `g2`'s initial node, and the result's terminals are
/// `g2`'s (remapped) terminals.
#[tracing::instrument(skip(g1, g2), fields(left = %g1.protocol_name, right = %g2.protocol_name))]
pub fn combine(g1: &Cfg, g2: &Cfg) -> Result<Cfg, CombineError> {
    let shared: Vec<Channel> = channels_of(g1).intersection(&channels_of(g2)).cloned().collect();
    if !shared.is_empty() {
        return Err(CombineError::ChannelConflict(shared));
    }

    let mut roles: Vec<Role> = g1.roles.clone();
    for r in &g2.roles {
        if !roles.contains(r) {
            roles.push(r.clone());
        }
    }

    let mut combined = Cfg::empty(format!("{}♢{}", g1.protocol_name, g2.protocol_name), roles);
    let left = copy_into(&mut combined, g1);
    let right = copy_into(&mut combined, g2);

    let combined_initial = left[&g1.initial()];
    combined.set_initial(combined_initial);

    let right_initial = right[&g2.initial()];
    for t in g1.terminals() {
        combined.add_edge(left[&t], right_initial, EdgeType::Sequence);
    }
    for t in g2.terminals() {
        combined.add_terminal(right[&t]);
    }

    if combined.terminals().next().is_none() {
        return Err(CombineError::StructuralViolation(
            "combined graph has no terminal node".to_string(),
        ));
    }

    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Protocol, Receivers, Role, Statement};
    use crate::cfg::builder::build_cfg;

    fn msg_protocol(name: &str, label: &str) -> Protocol {
        Protocol {
            name: name.to_string(),
            roles: vec![Role::new("A"), Role::new("B")],
            dynamic_roles: Vec::new(),
            body: Statement::Message {
                from: Role::new("A"),
                to: Receivers::One(Role::new("B")),
                label: label.to_string(),
                payload_type: None,
                span: None,
            },
        }
    }

    #[test]
    fn disjoint_channels_combine_into_one_reachable_chain() {
        let g1 = build_cfg(&msg_protocol("g1", "first")).unwrap();
        let g2 = build_cfg(&msg_protocol("g2", "second")).unwrap();

        let combined = combine(&g1, &g2).expect("disjoint channels always combine");
        assert_eq!(combined.node_count(), g1.node_count() + g2.node_count());
        assert_eq!(combined.terminals().count(), g2.terminals().count());
    }

    #[test]
    fn a_shared_channel_is_rejected() {
        let g1 = build_cfg(&msg_protocol("g1", "same")).unwrap();
        let g2 = build_cfg(&msg_protocol("g2", "same")).unwrap();

        let err = combine(&g1, &g2).expect_err("a shared channel cannot be told apart by observers");
        assert!(matches!(err, CombineError::ChannelConflict(_)));
    }
}
