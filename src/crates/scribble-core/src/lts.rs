//! Labeled transition system views used by bisimulation and trace checking
//! (§4.6, §4.7): the global CFG read directly as an LTS, and the composed
//! per-role CFSMs read as an asynchronous product with FIFO channel
//! buffers, one per ordered `(sender, receiver)` pair.
//!
//! Both views are stepped as [`TransitionEvent`] values so that states from
//! one can be compared directly against the other (§4.6): a global
//! `Message` node and the matching composed `Receive` transition carry the
//! *same* event, which is what lets [`crate::bisim::bisimilar`] relate a
//! synchronous global step to its asynchronous, buffered realization.
//! `Send` is silent here — committing a message to its channel buffer is
//! not itself the observable event, its delivery (the receive) is — and so
//! are `CreateParticipants`, subprotocol calls, and the inviter's side of
//! an `Invitation` (the invitee's `InviteReceive` carries the event).

use crate::ast::Role;
use crate::cfg::{Action, Cfg, NodeId, NodeKind};
use crate::cfsm::{Cfsm, CfsmAction, StateId};
use std::collections::BTreeMap;

/// A canonical observable event, comparable across the global and composed
/// LTS views regardless of which one produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransitionEvent {
    Message { from: String, to: String, label: String },
    Invite { from: String, to: String },
}

/// A single outgoing step: `event` is `None` for a silent (tau) step.
pub struct Step<S> {
    pub event: Option<TransitionEvent>,
    pub next: S,
}

impl<S> Step<S> {
    pub fn is_tau(&self) -> bool {
        self.event.is_none()
    }
}

/// Minimal interface both LTS views expose to the bisimulation and trace
/// algorithms.
pub trait Lts {
    type State: Clone + Eq + std::hash::Hash + std::fmt::Debug;

    fn initial(&self) -> Self::State;
    fn is_final(&self, state: &Self::State) -> bool;
    fn transitions(&self, state: &Self::State) -> Vec<Step<Self::State>>;
}

/// The global protocol read directly off its [`Cfg`]: one state per node. A
/// multicast `Message` node produces one step per receiver, all leading to
/// the same successor, matching how the composed view resolves a multicast
/// into one CFSM `Send` per receiver.
pub struct CfgLts<'a> {
    pub cfg: &'a Cfg,
}

impl<'a> Lts for CfgLts<'a> {
    type State = NodeId;

    fn initial(&self) -> NodeId {
        self.cfg.initial()
    }

    fn is_final(&self, state: &NodeId) -> bool {
        self.cfg.is_terminal(*state)
    }

    fn transitions(&self, state: &NodeId) -> Vec<Step<NodeId>> {
        let events: Vec<Option<TransitionEvent>> = match self.cfg.node_kind(*state) {
            Some(NodeKind::Action(Action::Message(m))) => m
                .to
                .iter()
                .map(|to| {
                    Some(TransitionEvent::Message {
                        from: m.from.0.clone(),
                        to: to.0.clone(),
                        label: m.label.clone(),
                    })
                })
                .collect(),
            Some(NodeKind::Action(Action::Invitation(i))) => vec![Some(TransitionEvent::Invite {
                from: i.inviter.0.clone(),
                to: i.invitee.0.clone(),
            })],
            _ => vec![None],
        };

        let mut out = Vec::new();
        for next in self.cfg.successors(*state, true) {
            for event in &events {
                out.push(Step {
                    event: event.clone(),
                    next,
                });
            }
        }
        out
    }
}

/// The event a CFSM transition carries, if any, from the perspective of the
/// composed asynchronous LTS (§4.6): a `Send` only commits to a buffer, so
/// it is silent here; its matching `Receive` is the observable delivery.
fn cfsm_event(role: &Role, action: &CfsmAction) -> Option<TransitionEvent> {
    match action {
        CfsmAction::Receive { from, label, .. } => Some(TransitionEvent::Message {
            from: from.0.clone(),
            to: role.0.clone(),
            label: label.clone(),
        }),
        CfsmAction::InviteReceive { inviter } => Some(TransitionEvent::Invite {
            from: inviter.0.clone(),
            to: role.0.clone(),
        }),
        _ => None,
    }
}

/// A composed state: each role's local CFSM state, plus the FIFO contents
/// of every `(sender, receiver)` channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComposedState {
    pub local: BTreeMap<Role, StateId>,
    pub buffers: BTreeMap<(Role, Role), Vec<String>>,
}

/// The composed per-role CFSMs, read as an asynchronous product (§4.6).
pub struct ComposedLts {
    pub cfsms: BTreeMap<Role, Cfsm>,
}

impl ComposedLts {
    pub fn new(cfsms: BTreeMap<Role, Cfsm>) -> Self {
        ComposedLts { cfsms }
    }
}

impl Lts for ComposedLts {
    type State = ComposedState;

    fn initial(&self) -> ComposedState {
        let local = self
            .cfsms
            .iter()
            .map(|(r, c)| (r.clone(), c.initial_state))
            .collect();
        ComposedState {
            local,
            buffers: BTreeMap::new(),
        }
    }

    fn is_final(&self, state: &ComposedState) -> bool {
        state.buffers.values().all(|q| q.is_empty())
            && self
                .cfsms
                .iter()
                .all(|(r, c)| c.is_terminal(state.local[r]))
    }

    fn transitions(&self, state: &ComposedState) -> Vec<Step<ComposedState>> {
        let mut out = Vec::new();
        for (role, cfsm) in &self.cfsms {
            let local_state = state.local[role];
            for t in cfsm.outgoing(local_state) {
                match &t.action {
                    CfsmAction::Send { to, label, .. } => {
                        let mut next = state.clone();
                        next.local.insert(role.clone(), t.to);
                        next.buffers
                            .entry((role.clone(), to.clone()))
                            .or_default()
                            .push(label.clone());
                        out.push(Step { event: None, next });
                    }
                    CfsmAction::Receive { from, label, .. } => {
                        let key = (from.clone(), role.clone());
                        let enabled = state
                            .buffers
                            .get(&key)
                            .and_then(|q| q.first())
                            .map(|front| front == label)
                            .unwrap_or(false);
                        if enabled {
                            let mut next = state.clone();
                            next.local.insert(role.clone(), t.to);
                            next.buffers.get_mut(&key).unwrap().remove(0);
                            out.push(Step {
                                event: cfsm_event(role, &t.action),
                                next,
                            });
                        }
                    }
                    _ => {
                        let mut next = state.clone();
                        next.local.insert(role.clone(), t.to);
                        out.push(Step {
                            event: cfsm_event(role, &t.action),
                            next,
                        });
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Protocol, Receivers, Statement};
    use crate::cfg::builder::build_cfg;
    use crate::project::project_all;

    fn ping_pong() -> Cfg {
        let proto = Protocol {
            name: "ping_pong".to_string(),
            roles: vec![Role::new("A"), Role::new("B")],
            dynamic_roles: Vec::new(),
            body: Statement::Sequence(vec![
                Statement::Message {
                    from: Role::new("A"),
                    to: Receivers::One(Role::new("B")),
                    label: "ping".to_string(),
                    payload_type: None,
                    span: None,
                },
                Statement::Message {
                    from: Role::new("B"),
                    to: Receivers::One(Role::new("A")),
                    label: "pong".to_string(),
                    payload_type: None,
                    span: None,
                },
            ]),
        };
        build_cfg(&proto).unwrap()
    }

    #[test]
    fn cfg_lts_starts_at_the_initial_node_and_is_not_final_there() {
        let cfg = ping_pong();
        let lts = CfgLts { cfg: &cfg };
        assert_eq!(lts.initial(), cfg.initial());
        assert!(!lts.is_final(&lts.initial()));
    }

    #[test]
    fn a_single_receiver_message_node_emits_exactly_one_event() {
        let cfg = ping_pong();
        let lts = CfgLts { cfg: &cfg };
        let steps = lts.transitions(&cfg.initial());
        // Initial -> first Message node is a silent structural step.
        assert_eq!(steps.len(), 1);
        assert!(steps[0].is_tau());

        let message_node = steps[0].next;
        let message_steps = lts.transitions(&message_node);
        assert_eq!(message_steps.len(), 1);
        assert_eq!(
            message_steps[0].event,
            Some(TransitionEvent::Message {
                from: "A".to_string(),
                to: "B".to_string(),
                label: "ping".to_string(),
            })
        );
    }

    #[test]
    fn composed_lts_initial_state_has_empty_buffers_and_local_initial_states() {
        let cfg = ping_pong();
        let (cfsms, errors) = project_all(&cfg);
        assert!(errors.is_empty());
        let lts = ComposedLts::new(cfsms.clone());
        let initial = lts.initial();
        assert!(initial.buffers.values().all(|q| q.is_empty()));
        for (role, cfsm) in &cfsms {
            assert_eq!(initial.local[role], cfsm.initial_state);
        }
        assert!(!lts.is_final(&initial));
    }

    #[test]
    fn a_receive_is_only_enabled_once_the_matching_send_has_fired() {
        let cfg = ping_pong();
        let (cfsms, errors) = project_all(&cfg);
        assert!(errors.is_empty());
        let lts = ComposedLts::new(cfsms);
        let initial = lts.initial();

        // Both roles still have to walk their own structural prefix before
        // reaching their first Send/Receive, so every step enabled from the
        // very first composed state is silent.
        let steps = lts.transitions(&initial);
        assert!(!steps.is_empty());
        assert!(steps.iter().all(|s| s.is_tau()));

        // Follow A's send through to where B's matching receive becomes
        // enabled and carries the observable event.
        let mut state = initial;
        let event = loop {
            let steps = lts.transitions(&state);
            if let Some(step) = steps.iter().find(|s| s.event.is_some()) {
                break step.event.clone().unwrap();
            }
            state = steps
                .into_iter()
                .next()
                .expect("ping-pong always has an enabled step")
                .next;
        };
        assert_eq!(
            event,
            TransitionEvent::Message {
                from: "A".to_string(),
                to: "B".to_string(),
                label: "ping".to_string(),
            }
        );
    }
}
