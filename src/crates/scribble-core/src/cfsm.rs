//! The per-role Communicating Finite State Machine, the projection target
//! (§3.3).

use crate::ast::{PayloadType, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub u32);

/// A CFSM transition's tagged action (§3.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfsmAction {
    Send {
        to: Role,
        label: String,
        payload: Option<PayloadType>,
    },
    Receive {
        from: Role,
        label: String,
        payload: Option<PayloadType>,
    },
    SubprotocolCall {
        protocol: String,
        participants: Vec<Role>,
    },
    Create {
        role_type: String,
        instance_name: Option<String>,
    },
    Invite {
        invitee: Role,
    },
    InviteReceive {
        inviter: Role,
    },
    /// Internal choice marker: this role is the one deciding at a branch.
    Choice,
    /// Epsilon / structural transition invisible to an observer.
    Tau,
}

impl CfsmAction {
    pub fn is_tau(&self) -> bool {
        matches!(self, CfsmAction::Tau)
    }

    /// A short alphabet label usable in trace/LTS printing, e.g. `!B.ping`
    /// or `?A.pong`, matching the boundary laws in `spec.md` §8.
    pub fn alphabet_label(&self) -> String {
        match self {
            CfsmAction::Send { to, label, .. } => format!("!{to}.{label}"),
            CfsmAction::Receive { from, label, .. } => format!("?{from}.{label}"),
            CfsmAction::SubprotocolCall { protocol, .. } => format!("call:{protocol}"),
            CfsmAction::Create { role_type, .. } => format!("create:{role_type}"),
            CfsmAction::Invite { invitee } => format!("invite:{invitee}"),
            CfsmAction::InviteReceive { inviter } => format!("invited-by:{inviter}"),
            CfsmAction::Choice => "choice".to_string(),
            CfsmAction::Tau => "tau".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    pub action: CfsmAction,
}

/// A role's local type, expressed as a labeled transition system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cfsm {
    pub role: Role,
    pub states: BTreeSet<StateId>,
    pub initial_state: StateId,
    pub terminal_states: BTreeSet<StateId>,
    pub transitions: Vec<Transition>,
}

impl Cfsm {
    pub fn new(role: Role, initial_state: StateId) -> Self {
        let mut states = BTreeSet::new();
        states.insert(initial_state);
        Cfsm {
            role,
            states,
            initial_state,
            terminal_states: BTreeSet::new(),
            transitions: Vec::new(),
        }
    }

    pub fn add_state(&mut self, id: StateId) {
        self.states.insert(id);
    }

    pub fn mark_terminal(&mut self, id: StateId) {
        self.add_state(id);
        self.terminal_states.insert(id);
    }

    pub fn add_transition(&mut self, from: StateId, to: StateId, action: CfsmAction) {
        self.add_state(from);
        self.add_state(to);
        self.transitions.push(Transition { from, to, action });
    }

    pub fn outgoing(&self, state: StateId) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.from == state)
    }

    pub fn is_terminal(&self, state: StateId) -> bool {
        self.terminal_states.contains(&state)
    }

    /// Branching states with >= 2 non-tau outgoing transitions, used by the
    /// §3.3 internal/external choice invariant check.
    pub fn branching_states(&self) -> Vec<StateId> {
        self.states
            .iter()
            .copied()
            .filter(|&s| self.outgoing(s).filter(|t| !t.action.is_tau()).count() >= 2)
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
