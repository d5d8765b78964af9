//! DOT export for CFGs (`spec.md` §6.3): circles for Initial/Terminal, boxes
//! otherwise, labels from the fixed printer (`A → B: ℓ`, `branch at R`,
//! `fork p`, `rec X`).

use crate::cfg::{Action, Cfg, EdgeType, NodeKind};

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_label(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Initial => "start".to_string(),
        NodeKind::Terminal => "end".to_string(),
        NodeKind::Branch { at } => format!("branch at {at}"),
        NodeKind::Merge => "merge".to_string(),
        NodeKind::Fork { parallel_id } => format!("fork {}", parallel_id.0),
        NodeKind::Join { parallel_id } => format!("join {}", parallel_id.0),
        NodeKind::Recursive { label } => format!("rec {label}"),
        NodeKind::Action(Action::Message(m)) => {
            let to = m
                .to
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!("{} \u{2192} {}: {}", m.from, to, m.label)
        }
        NodeKind::Action(Action::SubprotocolCall(c)) => {
            format!("call {}({})", c.protocol, c.caller)
        }
        NodeKind::Action(Action::CreateParticipants(c)) => {
            format!("create {} by {}", c.role_type, c.creator)
        }
        NodeKind::Action(Action::Invitation(i)) => {
            format!("invite {} -> {}", i.inviter, i.invitee)
        }
        NodeKind::Action(Action::UpdatableRecursion(u)) => {
            format!("update {}", u.label)
        }
    }
}

fn node_shape(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Initial | NodeKind::Terminal => "circle",
        _ => "box",
    }
}

/// Render a [`Cfg`] as a GraphViz DOT digraph.
pub fn to_dot(cfg: &Cfg) -> String {
    let mut out = String::new();
    out.push_str("digraph {\n");
    out.push_str(&format!("  label=\"{}\";\n", escape(&cfg.protocol_name)));

    for id in cfg.node_ids() {
        let kind = cfg.node_kind(id).expect("node id came from this cfg");
        out.push_str(&format!(
            "  n{} [shape={}, label=\"{}\"];\n",
            id.0,
            node_shape(kind),
            escape(&node_label(kind))
        ));
    }

    for eid in cfg.edge_ids() {
        let (from, to) = cfg.edge_endpoints(eid).unwrap();
        let style = match cfg.edge_type(eid).unwrap() {
            EdgeType::Sequence => "",
            EdgeType::Branch => " [style=dashed]",
            EdgeType::Fork => " [style=dotted]",
            EdgeType::Continue => " [style=bold, constraint=false]",
        };
        out.push_str(&format!("  n{} -> n{}{};\n", from.0, to.0, style));
    }

    out.push_str("}\n");
    out
}
