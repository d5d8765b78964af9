//! Abstract syntax for global multiparty protocols (§3.1).
//!
//! This is the typed tree the external surface-syntax parser (out of scope
//! for this crate; see `spec.md` §1) is expected to produce. Everything
//! downstream — the CFG builder, verifier, projector — consumes `Protocol`
//! values read-only.

use serde::{Deserialize, Serialize};

/// An abstract participant identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Role(pub String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Role(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role(s.to_string())
    }
}

/// A byte-offset span into the original protocol source, carried through
/// from the external parser and echoed in error values (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

/// A payload type name as declared in a message signature. The core treats
/// this opaquely — it never inspects or typechecks payloads.
pub type PayloadType = String;

/// Who receives a message: a single role, or an explicit multicast set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Receivers {
    One(Role),
    Many(Vec<Role>),
}

impl Receivers {
    pub fn as_slice(&self) -> Vec<&Role> {
        match self {
            Receivers::One(r) => vec![r],
            Receivers::Many(rs) => rs.iter().collect(),
        }
    }

    pub fn is_multicast(&self) -> bool {
        matches!(self, Receivers::Many(rs) if rs.len() > 1)
    }
}

/// A single statement in a global protocol body (§3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    Message {
        from: Role,
        to: Receivers,
        label: String,
        payload_type: Option<PayloadType>,
        span: Option<SourceSpan>,
    },
    Choice {
        at: Role,
        branches: Vec<Statement>,
        span: Option<SourceSpan>,
    },
    Parallel {
        branches: Vec<Statement>,
        span: Option<SourceSpan>,
    },
    Sequence(Vec<Statement>),
    Recursion {
        label: String,
        body: Box<Statement>,
        span: Option<SourceSpan>,
    },
    Continue {
        label: String,
        span: Option<SourceSpan>,
    },
    /// DMst: a `continue` whose recursion body may be replaced by
    /// `update_body` on the next iteration (Definition 14, §4.5).
    UpdatableContinue {
        label: String,
        update_body: Box<Statement>,
        span: Option<SourceSpan>,
    },
    SubprotocolCall {
        caller: Role,
        protocol: String,
        arguments: Vec<Role>,
        span: Option<SourceSpan>,
    },
    CreateParticipant {
        creator: Role,
        role_type: String,
        instance_name: Option<String>,
        span: Option<SourceSpan>,
    },
    Invitation {
        inviter: Role,
        invitee: Role,
        span: Option<SourceSpan>,
    },
    End,
}

/// A declared dynamic role type (DMst participant creation, §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRoleDecl {
    pub role_type: String,
}

/// A complete parsed global protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub roles: Vec<Role>,
    pub dynamic_roles: Vec<DynamicRoleDecl>,
    pub body: Statement,
}

impl Protocol {
    /// Roles mentioned anywhere in the body, in first-occurrence order,
    /// used by the builder to extend the declared role list (§4.1 tie-breaks).
    pub fn mentioned_roles(&self) -> Vec<Role> {
        let mut seen = Vec::new();
        collect_roles(&self.body, &mut seen);
        seen
    }
}

/// Walks the statement tree with an explicit worklist rather than native
/// recursion, so role collection doesn't add a second stack-depth bound on
/// top of whatever the external parser already enforces for nesting depth.
fn collect_roles(root: &Statement, out: &mut Vec<Role>) {
    fn push(r: &Role, out: &mut Vec<Role>) {
        if !out.contains(r) {
            out.push(r.clone());
        }
    }

    let mut worklist: Vec<&Statement> = vec![root];
    while let Some(stmt) = worklist.pop() {
        match stmt {
            Statement::Message { from, to, .. } => {
                push(from, out);
                for r in to.as_slice() {
                    push(r, out);
                }
            }
            Statement::Choice { at, branches, .. } => {
                push(at, out);
                worklist.extend(branches.iter().rev());
            }
            Statement::Parallel { branches, .. } => {
                worklist.extend(branches.iter().rev());
            }
            Statement::Sequence(stmts) => {
                worklist.extend(stmts.iter().rev());
            }
            Statement::Recursion { body, .. } => worklist.push(body),
            Statement::UpdatableContinue { update_body, .. } => worklist.push(update_body),
            Statement::SubprotocolCall {
                caller, arguments, ..
            } => {
                push(caller, out);
                for r in arguments {
                    push(r, out);
                }
            }
            Statement::CreateParticipant { creator, .. } => push(creator, out),
            Statement::Invitation {
                inviter, invitee, ..
            } => {
                push(inviter, out);
                push(invitee, out);
            }
            Statement::Continue { .. } | Statement::End => {}
        }
    }
}
