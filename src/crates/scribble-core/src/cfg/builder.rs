//! Lowers a parsed [`Protocol`] into a [`Cfg`] (§4.1).
//!
//! Each lowering rule rewrites one AST form into a fragment with a single
//! entry node and a single exit node; fragments are chained by wiring a
//! `sequence` edge from the predecessor's exit to the successor's entry.

use crate::ast::{Protocol, Receivers, Role, Statement};
use crate::cfg::{
    Action, Cfg, CreateParticipantsAction, EdgeType, InvitationAction, MessageAction, NodeId,
    NodeKind, ParallelId, SubprotocolCallAction, UpdatableRecursionAction,
};
use crate::error::BuildError;

/// A lowered fragment: a single entry node and a single exit node, the unit
/// the builder chains statements together with.
struct Fragment {
    entry: NodeId,
    exit: NodeId,
}

/// Tracks the `Recursive{X}` head node for each recursion label currently in
/// scope, so `Continue`/`UpdatableContinue` can resolve their target and
/// detect label shadowing (§4.1 errors).
struct Scope<'a> {
    labels: Vec<(&'a str, NodeId)>,
}

impl<'a> Scope<'a> {
    fn new() -> Self {
        Scope { labels: Vec::new() }
    }

    fn resolve(&self, label: &str) -> Option<NodeId> {
        self.labels
            .iter()
            .rev()
            .find(|(l, _)| *l == label)
            .map(|(_, id)| *id)
    }

    fn push(&mut self, label: &'a str, head: NodeId) -> Result<(), BuildError> {
        if self.labels.iter().any(|(l, _)| *l == label) {
            return Err(BuildError::ShadowedLabel {
                label: label.to_string(),
                span: None,
            });
        }
        self.labels.push((label, head));
        Ok(())
    }

    fn pop(&mut self) {
        self.labels.pop();
    }
}

/// Build a [`Cfg`] satisfying every §3.2 structural invariant from a parsed
/// global protocol, or fail with the [`BuildError`] identifying the
/// offending construct.
#[tracing::instrument(skip(protocol), fields(protocol = %protocol.name))]
pub fn build_cfg(protocol: &Protocol) -> Result<Cfg, BuildError> {
    let mut roles = protocol.roles.clone();
    for r in protocol.mentioned_roles() {
        if !roles.contains(&r) {
            roles.push(r);
        }
    }
    if roles.is_empty() {
        return Err(BuildError::NoRoles);
    }

    let mut cfg = Cfg::empty(protocol.name.clone(), roles);
    let initial = cfg.add_node(NodeKind::Initial, None);
    cfg.set_initial(initial);

    let mut scope = Scope::new();
    let body = lower(&mut cfg, &protocol.body, &mut scope)?;
    cfg.add_edge(initial, body.entry, EdgeType::Sequence);

    // `terminate` guards against marking a bare `Action` node as the sink
    // directly: projection and the LTS views attribute a node's action to
    // its outgoing edge, so an action node with no successor would have its
    // own effect silently dropped from every role's view.
    let sink = terminate(&mut cfg, body.exit);
    cfg.add_terminal(sink);

    Ok(cfg)
}

/// Wire `exit` to a fresh terminal sink unless it already is one, so that a
/// bare action used as a protocol's final statement still gets an outgoing
/// edge to carry its own effect (§4.1, §4.3).
fn terminate(cfg: &mut Cfg, exit: NodeId) -> NodeId {
    if matches!(cfg.node_kind(exit), Some(NodeKind::Terminal)) {
        return exit;
    }
    let sink = cfg.add_node(NodeKind::Terminal, None);
    cfg.add_edge(exit, sink, EdgeType::Sequence);
    sink
}

fn lower<'a>(
    cfg: &mut Cfg,
    stmt: &'a Statement,
    scope: &mut Scope<'a>,
) -> Result<Fragment, BuildError> {
    match stmt {
        Statement::End => {
            let n = cfg.add_node(NodeKind::Terminal, None);
            Ok(Fragment { entry: n, exit: n })
        }

        Statement::Message {
            from,
            to,
            label,
            payload_type,
            span,
        } => {
            let receivers: Vec<Role> = to.as_slice().into_iter().cloned().collect();
            if receivers.is_empty() {
                return Err(BuildError::EmptyMulticast {
                    label: label.clone(),
                    span: *span,
                });
            }
            let n = cfg.add_node(
                NodeKind::Action(Action::Message(MessageAction {
                    from: from.clone(),
                    to: receivers,
                    label: label.clone(),
                    payload_type: payload_type.clone(),
                })),
                *span,
            );
            Ok(Fragment { entry: n, exit: n })
        }

        Statement::Sequence(stmts) => lower_sequence(cfg, stmts, scope),

        Statement::Choice { at, branches, span } => {
            if branches.len() < 2 {
                return Err(BuildError::EmptyChoice {
                    role: at.0.clone(),
                    span: *span,
                });
            }
            let branch_node = cfg.add_node(NodeKind::Branch { at: at.clone() }, *span);
            let merge_node = cfg.add_node(NodeKind::Merge, None);
            for b in branches {
                let frag = lower(cfg, b, scope)?;
                cfg.add_edge(branch_node, frag.entry, EdgeType::Branch);
                cfg.add_edge(frag.exit, merge_node, EdgeType::Sequence);
            }
            Ok(Fragment {
                entry: branch_node,
                exit: merge_node,
            })
        }

        Statement::Parallel { branches, span } => {
            if branches.len() < 2 {
                return Err(BuildError::EmptyParallel { span: *span });
            }
            let pid = ParallelId(cfg.node_count() as u32);
            let fork_node = cfg.add_node(
                NodeKind::Fork {
                    parallel_id: pid,
                },
                *span,
            );
            let join_node = cfg.add_node(
                NodeKind::Join {
                    parallel_id: pid,
                },
                None,
            );
            for b in branches {
                let frag = lower(cfg, b, scope)?;
                cfg.add_edge(fork_node, frag.entry, EdgeType::Fork);
                cfg.add_edge(frag.exit, join_node, EdgeType::Sequence);
            }
            Ok(Fragment {
                entry: fork_node,
                exit: join_node,
            })
        }

        Statement::Recursion { label, body, span } => {
            let head = cfg.add_node(
                NodeKind::Recursive {
                    label: label.clone(),
                },
                *span,
            );
            scope.push(label, head)?;
            let inner = lower(cfg, body, scope);
            scope.pop();
            let inner = inner?;
            cfg.add_edge(head, inner.entry, EdgeType::Sequence);
            Ok(Fragment {
                entry: head,
                exit: inner.exit,
            })
        }

        Statement::Continue { label, span } => {
            let head = scope.resolve(label).ok_or_else(|| BuildError::UnresolvedContinueLabel {
                label: label.clone(),
                span: *span,
            })?;
            let exit = cfg.add_node(NodeKind::Terminal, *span);
            cfg.add_edge(exit, head, EdgeType::Continue);
            cfg.add_terminal(exit);
            Ok(Fragment { entry: exit, exit })
        }

        Statement::UpdatableContinue {
            label,
            update_body,
            span,
        } => {
            let head = scope.resolve(label).ok_or_else(|| BuildError::UnresolvedContinueLabel {
                label: label.clone(),
                span: *span,
            })?;
            let action = cfg.add_node(
                NodeKind::Action(Action::UpdatableRecursion(UpdatableRecursionAction {
                    label: label.clone(),
                })),
                *span,
            );
            let exit = cfg.add_node(NodeKind::Terminal, None);
            cfg.add_edge(action, exit, EdgeType::Sequence);
            cfg.add_edge(action, head, EdgeType::Continue);
            cfg.add_terminal(exit);

            // The update body G' is built as an independent fragment/CFG
            // discoverable by label (§4.1), consumed later by the DMst
            // safe-update checker (§4.5).
            let mut update_cfg = Cfg::empty(format!("{label}::update"), cfg.roles.clone());
            let update_initial = update_cfg.add_node(NodeKind::Initial, None);
            update_cfg.set_initial(update_initial);
            let mut update_scope = Scope::new();
            let update_frag = lower(&mut update_cfg, update_body, &mut update_scope)?;
            update_cfg.add_edge(update_initial, update_frag.entry, EdgeType::Sequence);
            let update_sink = terminate(&mut update_cfg, update_frag.exit);
            update_cfg.add_terminal(update_sink);
            cfg.insert_update_body(label.clone(), update_cfg);

            Ok(Fragment {
                entry: action,
                exit,
            })
        }

        Statement::SubprotocolCall {
            caller,
            protocol,
            arguments,
            span,
        } => {
            let n = cfg.add_node(
                NodeKind::Action(Action::SubprotocolCall(SubprotocolCallAction {
                    caller: caller.clone(),
                    protocol: protocol.clone(),
                    arguments: arguments.clone(),
                })),
                *span,
            );
            Ok(Fragment { entry: n, exit: n })
        }

        Statement::CreateParticipant {
            creator,
            role_type,
            instance_name,
            span,
        } => {
            let n = cfg.add_node(
                NodeKind::Action(Action::CreateParticipants(CreateParticipantsAction {
                    creator: creator.clone(),
                    role_type: role_type.clone(),
                    instance_name: instance_name.clone(),
                })),
                *span,
            );
            Ok(Fragment { entry: n, exit: n })
        }

        Statement::Invitation {
            inviter,
            invitee,
            span,
        } => {
            let n = cfg.add_node(
                NodeKind::Action(Action::Invitation(InvitationAction {
                    inviter: inviter.clone(),
                    invitee: invitee.clone(),
                })),
                *span,
            );
            Ok(Fragment { entry: n, exit: n })
        }
    }
}

fn lower_sequence<'a>(
    cfg: &mut Cfg,
    stmts: &'a [Statement],
    scope: &mut Scope<'a>,
) -> Result<Fragment, BuildError> {
    if stmts.is_empty() {
        let n = cfg.add_node(NodeKind::Terminal, None);
        return Ok(Fragment { entry: n, exit: n });
    }
    let mut iter = stmts.iter();
    let first = lower(cfg, iter.next().unwrap(), scope)?;
    let entry = first.entry;
    let mut exit = first.exit;
    for stmt in iter {
        let frag = lower(cfg, stmt, scope)?;
        cfg.add_edge(exit, frag.entry, EdgeType::Sequence);
        exit = frag.exit;
    }
    Ok(Fragment { entry, exit })
}
