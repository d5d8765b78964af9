//! DMst safe protocol update checking (Definition 14, §4.5): given a
//! recursion label with an `UpdatableContinue`, extract the recursion body
//! `G`, combine it with the update body `G'` via ♢ to build the
//! 1-unfolding `U₁ = G ♢ G'`, and verify `U₁` is itself well-formed.
//!
//! Verifying the 1-unfolding stands in for verifying every later unfolding
//! of the updated protocol: once the channels `G` and `G'` use are disjoint
//! (enforced by `combine`), the update only ever replaces the *next*
//! iteration's body, so the reasoning does not need to look further ahead.

use crate::cfg::{Cfg, EdgeType, NodeId, NodeKind};
use crate::combine;
use crate::error::SafeUpdateError;
use crate::verify;
use std::collections::HashMap;

fn find_recursive_head(cfg: &Cfg, label: &str) -> Option<NodeId> {
    cfg.node_ids().find(|&id| {
        matches!(cfg.node_kind(id), Some(NodeKind::Recursive { label: l }) if l == label)
    })
}

fn find_updatable_action(cfg: &Cfg, label: &str) -> Option<NodeId> {
    use crate::cfg::Action;
    cfg.node_ids().find(|&id| {
        matches!(
            cfg.node_kind(id),
            Some(NodeKind::Action(Action::UpdatableRecursion(u))) if u.label == label
        )
    })
}

/// Extract an independent [`Cfg`] for the recursion body bounded by `head`
/// (inclusive) and `stop` (exclusive) — every edge that would leave the
/// region by reaching `stop` is redirected to a fresh terminal node instead.
pub(crate) fn extract_recursion_body(cfg: &Cfg, head: NodeId, stop: NodeId) -> Cfg {
    let region = crate::cfg::utils::extract_subgraph(cfg, head, stop);
    let mut body = Cfg::empty("recursion-body", cfg.roles.clone());
    let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
    for &id in &region {
        let data = cfg.node(id).expect("node id came from this cfg");
        mapping.insert(id, body.add_node(data.kind.clone(), data.span));
    }

    let terminal = body.add_node(NodeKind::Terminal, None);
    let mut any_exit_edge = false;
    for eid in cfg.edge_ids() {
        let (from, to) = cfg.edge_endpoints(eid).expect("edge id came from this cfg");
        if !region.contains(&from) {
            continue;
        }
        let edge_type = cfg.edge_type(eid).expect("edge id came from this cfg");
        if to == stop {
            body.add_edge(mapping[&from], terminal, EdgeType::Sequence);
            any_exit_edge = true;
        } else if let Some(&mapped_to) = mapping.get(&to) {
            body.add_edge(mapping[&from], mapped_to, edge_type);
        }
    }
    if !any_exit_edge {
        body.add_edge(mapping[&head], terminal, EdgeType::Sequence);
    }

    body.set_initial(mapping[&head]);
    body.add_terminal(terminal);
    body
}

/// Check that replacing recursion `label`'s body with its declared update
/// body produces a well-formed 1-unfolding (§4.5 Definition 14).
#[tracing::instrument(skip(cfg), fields(protocol = %cfg.protocol_name, label = %label))]
pub fn check_safe_update(cfg: &Cfg, label: &str) -> Result<(), SafeUpdateError> {
    let head = find_recursive_head(cfg, label).ok_or_else(|| SafeUpdateError {
        label: label.to_string(),
        reason: "no enclosing recursion found for this label".to_string(),
        location: None,
    })?;
    let action = find_updatable_action(cfg, label).ok_or_else(|| SafeUpdateError {
        label: label.to_string(),
        reason: "no updatable continue found for this label".to_string(),
        location: Some(head),
    })?;
    let update_body = cfg.update_body(label).ok_or_else(|| SafeUpdateError {
        label: label.to_string(),
        reason: "no update body registered for this label".to_string(),
        location: Some(action),
    })?;

    let body = extract_recursion_body(cfg, head, action);
    let unfolding = combine::combine(&body, update_body).map_err(|e| SafeUpdateError {
        label: label.to_string(),
        reason: e.to_string(),
        location: Some(action),
    })?;

    let report = verify::verify(&unfolding);
    if report.has_errors() {
        let reason = report
            .errors()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SafeUpdateError {
            label: label.to_string(),
            reason,
            location: Some(action),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Protocol, Receivers, Role, Statement};
    use crate::cfg::builder::build_cfg;

    fn msg(from: &str, to: &str, label: &str) -> Statement {
        Statement::Message {
            from: Role::new(from),
            to: Receivers::One(Role::new(to)),
            label: label.to_string(),
            payload_type: None,
            span: None,
        }
    }

    #[test]
    fn a_label_with_no_recursion_is_rejected() {
        let proto = Protocol {
            name: "p".to_string(),
            roles: vec![Role::new("A"), Role::new("B")],
            dynamic_roles: Vec::new(),
            body: msg("A", "B", "hello"),
        };
        let cfg = build_cfg(&proto).unwrap();

        let err = check_safe_update(&cfg, "NoSuchLabel").unwrap_err();
        assert!(err.reason.contains("no enclosing recursion"));
    }

    #[test]
    fn a_recursion_with_no_updatable_continue_has_no_registered_update() {
        let proto = Protocol {
            name: "p".to_string(),
            roles: vec![Role::new("A"), Role::new("B")],
            dynamic_roles: Vec::new(),
            body: Statement::Recursion {
                label: "Loop".to_string(),
                body: Box::new(Statement::Sequence(vec![
                    msg("A", "B", "ping"),
                    Statement::Continue {
                        label: "Loop".to_string(),
                        span: None,
                    },
                ])),
                span: None,
            },
        };
        let cfg = build_cfg(&proto).unwrap();

        let err = check_safe_update(&cfg, "Loop").unwrap_err();
        assert!(err.reason.contains("no updatable continue"));
    }
}
