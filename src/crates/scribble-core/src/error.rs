//! Error types for every stage of the verification and projection pipeline.
//!
//! All errors implement `std::error::Error` via the `thiserror` crate and are
//! plain values: no stage in this crate panics or throws on malformed input
//! it can identify.
//!
//! # Error Hierarchy
//!
//! ```text
//! BuildError         - CFG construction (§4.1)
//! ProjectionError     - per-role projection (§4.3)
//! VerificationError   - one variant per well-formedness check (§4.2)
//! CombineError        - the ♢ combining operator (§4.4)
//! SafeUpdateError     - DMst 1-unfolding safety (§4.5)
//! BisimulationError   - weak bisimulation (§4.6)
//! LivenessError       - liveness sub-properties (§4.7)
//! ```

use crate::ast::SourceSpan;
use crate::cfg::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while lowering an AST into a [`crate::cfg::Cfg`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BuildError {
    #[error("continue label '{label}' has no enclosing recursion")]
    UnresolvedContinueLabel {
        label: String,
        span: Option<SourceSpan>,
    },

    #[error("recursion label '{label}' shadows an enclosing recursion with the same label")]
    ShadowedLabel {
        label: String,
        span: Option<SourceSpan>,
    },

    #[error("message '{label}' has an empty receiver set")]
    EmptyMulticast {
        label: String,
        span: Option<SourceSpan>,
    },

    #[error("choice at '{role}' has fewer than two branches")]
    EmptyChoice { role: String, span: Option<SourceSpan> },

    #[error("parallel composition has fewer than two branches")]
    EmptyParallel { span: Option<SourceSpan> },

    #[error("protocol declares no roles")]
    NoRoles,
}

/// Errors raised while projecting a [`crate::cfg::Cfg`] onto a role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ProjectionError {
    #[error("role '{0}' is not declared on this protocol")]
    UnknownRole(String),

    #[error("cannot project: P0 check '{check}' failed for role '{role}'")]
    P0Violation { role: String, check: String },

    #[error("cannot merge continuations for role '{role}' at node {node:?}: {reason}")]
    MergeFailure {
        role: String,
        node: NodeId,
        reason: String,
    },

    #[error("updatable recursion '{label}' is not safely projectable: {reason}")]
    UnsafeUpdatableRecursion { label: String, reason: String },
}

/// One entry in a [`crate::verify::VerificationReport`]; also the error
/// taxonomy used to describe *why* a check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum VerificationError {
    #[error("role(s) {0:?} never appear as sender or receiver of any message")]
    Disconnected(Vec<String>),

    #[error("branch at node {branch:?} is not deterministic: label '{label}' repeats")]
    NonDeterministicChoice { branch: NodeId, label: String },

    #[error("branches of node {branch:?} are not mergeable: {reason}")]
    UnmergeableChoice { branch: NodeId, reason: String },

    #[error("deadlock: cycle detected among nodes {cycle:?} outside any recursion body")]
    Deadlock { cycle: Vec<NodeId> },

    #[error("node {0:?} cannot reach any terminal node")]
    NotLive(NodeId),

    #[error("parallel branches of fork {fork:?} form a cross-branch dependency cycle")]
    ParallelDeadlock { fork: NodeId },

    #[error("race condition on channel ({from} -> {to}) inside fork {fork:?}")]
    RaceCondition {
        fork: NodeId,
        from: String,
        to: String,
    },

    #[error("continue '{label}' at node {node:?} escapes its enclosing recursion")]
    InvalidContinue { node: NodeId, label: String },

    #[error("recursion '{label}' spans fork/join pair {fork:?}/{join:?}")]
    RecursionInParallel {
        label: String,
        fork: NodeId,
        join: NodeId,
    },

    #[error("fork {fork:?} does not have exactly one matching join")]
    ForkJoinMismatch { fork: NodeId },

    #[error("self-communication: role '{0}' sends a message to itself")]
    SelfCommunication(String),

    #[error("choice branch at node {0:?} is empty")]
    EmptyBranch(NodeId),

    #[error("branches of node {branch:?} do not all reach the same merge node")]
    MergeUnreachable { branch: NodeId },

    #[error("multicast at node {node:?} has {count} receivers")]
    Multicast { node: NodeId, count: usize },
}

/// A `(sender, receiver, label)` triple identifying a channel used in
/// channel-disjointness checks for the combining operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub from: String,
    pub to: String,
    pub label: String,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {}: {})", self.from, self.to, self.label)
    }
}

/// Errors raised by the ♢ combining operator (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CombineError {
    #[error("channel conflicts between the two operands: {0:?}")]
    ChannelConflict(Vec<Channel>),

    #[error("the combined graph violates structural invariant: {0}")]
    StructuralViolation(String),
}

/// Errors raised while checking DMst Definition 14 safe updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("update '{label}' is unsafe: {reason}")]
pub struct SafeUpdateError {
    pub label: String,
    pub reason: String,
    pub location: Option<NodeId>,
}

/// A trace prefix plus the divergence point where two LTSs failed to match,
/// returned when [`crate::bisim::bisimilar`] finds the systems inequivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterexample {
    pub global_trace: Vec<String>,
    pub composed_trace: Vec<String>,
    pub divergence: DivergencePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergencePoint {
    pub global_state: String,
    pub composed_state: String,
    pub unmatched_action: String,
    pub message: String,
}

/// Errors raised while deciding weak bisimulation (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BisimulationError {
    #[error("global and composed LTS are not bisimilar")]
    NotBisimilar { counterexample: Counterexample },

    #[error("bisimulation exploration exceeded the configured state-pair bound ({limit})")]
    BoundExceeded { limit: usize },
}

/// Errors raised while checking liveness sub-properties (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LivenessError {
    #[error("orphan message: {from} -> {to}: {label} has no matching receive")]
    Orphan {
        from: String,
        to: String,
        label: String,
    },

    #[error("role '{role}' is stuck at a non-terminal state with no enabled action")]
    Stuck { role: String, state: String },

    #[error("channel ({from} -> {to}) grows unboundedly under every schedule")]
    UnboundedBuffer { from: String, to: String },
}

/// Edge- or node-scoped structural errors shared by CFG utilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CfgError {
    #[error("node {0:?} does not exist in this graph")]
    UnknownNode(NodeId),

    #[error("edge {0:?} does not exist in this graph")]
    UnknownEdge(EdgeId),

    #[error("graph has no initial node")]
    MissingInitial,

    #[error("graph has no terminal node")]
    MissingTerminal,
}
