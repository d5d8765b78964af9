//! The normalized Control Flow Graph intermediate representation (§3.2).
//!
//! A [`Cfg`] is a directed labeled multigraph. Nodes and edges are keyed by
//! opaque integer ids backed by a `petgraph` arena — this gives us the
//! "arena + integer ids, no cyclic ownership" shape `spec.md` §9 asks for
//! without hand-rolling one: `petgraph::graph::DiGraph` already stores nodes
//! and edges in flat vectors addressed by index, and a `continue` back-edge
//! is just an `EdgeIndex` like any other, carrying no ownership semantics.

pub mod builder;
pub mod dot;
pub mod utils;

use crate::ast::{PayloadType, Role, SourceSpan};
use petgraph::graph::DiGraph;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Opaque node identifier. Stable for the lifetime of a [`Cfg`] because CFGs
/// are immutable after construction (§3.2 Lifecycle) — nodes are never
/// removed, only ever produced fresh by the builder or by subgraph extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl NodeId {
    pub(crate) fn from_index(idx: NodeIndex) -> Self {
        NodeId(idx.index() as u32)
    }

    pub(crate) fn to_index(self) -> NodeIndex {
        NodeIndex::new(self.0 as usize)
    }
}

impl EdgeId {
    pub(crate) fn from_index(idx: EdgeIndex) -> Self {
        EdgeId(idx.index() as u32)
    }

    pub(crate) fn to_index(self) -> EdgeIndex {
        EdgeIndex::new(self.0 as usize)
    }
}

/// Fresh identifier pairing a `Fork` with its matching `Join` (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParallelId(pub u32);

/// A global message send/receive action embedded in an `Action` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub from: Role,
    pub to: Vec<Role>,
    pub label: String,
    pub payload_type: Option<PayloadType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprotocolCallAction {
    pub caller: Role,
    pub protocol: String,
    pub arguments: Vec<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateParticipantsAction {
    pub creator: Role,
    pub role_type: String,
    pub instance_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationAction {
    pub inviter: Role,
    pub invitee: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatableRecursionAction {
    pub label: String,
}

/// The tagged action carried by an `Action` node (§3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Message(MessageAction),
    SubprotocolCall(SubprotocolCallAction),
    CreateParticipants(CreateParticipantsAction),
    Invitation(InvitationAction),
    UpdatableRecursion(UpdatableRecursionAction),
}

/// Closed node variant set (§3.2). Adding a variant is a breaking change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Initial,
    Terminal,
    Action(Action),
    Branch { at: Role },
    Merge,
    Fork { parallel_id: ParallelId },
    Join { parallel_id: ParallelId },
    Recursive { label: String },
}

/// The closed edge-type set (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Sequence,
    Branch,
    Fork,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub kind: NodeKind,
    pub span: Option<SourceSpan>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeData {
    pub edge_type: EdgeType,
}

/// The normalized control flow graph for one global protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub protocol_name: String,
    pub roles: Vec<Role>,
    graph: DiGraph<NodeData, EdgeData>,
    initial: NodeId,
    terminals: BTreeSet<NodeId>,
    /// DMst update bodies (the `G'` of each `UpdatableContinue`), keyed by
    /// recursion label and built independently of the main graph at lowering
    /// time (§4.1 lowering rule for `UpdatableContinue`; see DESIGN.md for
    /// why this is captured directly rather than re-extracted by a second
    /// graph walk).
    update_bodies: BTreeMap<String, Cfg>,
}

/// Plain node/edge record used for the JSON encoding required by `spec.md` §6.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub span: Option<SourceSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub edge_type: EdgeType,
}

/// The canonical JSON shape of a [`Cfg`] (`spec.md` §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgDocument {
    pub protocol_name: String,
    pub roles: Vec<Role>,
    pub initial_node: NodeId,
    pub terminal_nodes: Vec<NodeId>,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Cfg {
    pub(crate) fn empty(protocol_name: impl Into<String>, roles: Vec<Role>) -> Self {
        Cfg {
            protocol_name: protocol_name.into(),
            roles,
            graph: DiGraph::new(),
            initial: NodeId(0),
            terminals: BTreeSet::new(),
            update_bodies: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_update_body(&mut self, label: String, body: Cfg) {
        self.update_bodies.insert(label, body);
    }

    /// The independently-built update body `G'` for an `UpdatableContinue`
    /// recursion label, if the CFG contains one (§4.1, §4.5).
    pub fn update_body(&self, label: &str) -> Option<&Cfg> {
        self.update_bodies.get(label)
    }

    pub fn update_body_labels(&self) -> impl Iterator<Item = &str> {
        self.update_bodies.keys().map(|s| s.as_str())
    }

    pub(crate) fn add_node(&mut self, kind: NodeKind, span: Option<SourceSpan>) -> NodeId {
        NodeId::from_index(self.graph.add_node(NodeData { kind, span }))
    }

    pub(crate) fn add_edge(&mut self, from: NodeId, to: NodeId, edge_type: EdgeType) -> EdgeId {
        EdgeId::from_index(
            self.graph
                .add_edge(from.to_index(), to.to_index(), EdgeData { edge_type }),
        )
    }

    pub(crate) fn set_initial(&mut self, id: NodeId) {
        self.initial = id;
    }

    pub(crate) fn add_terminal(&mut self, id: NodeId) {
        self.terminals.insert(id);
    }

    pub fn initial(&self) -> NodeId {
        self.initial
    }

    pub fn terminals(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.terminals.iter().copied()
    }

    pub fn is_terminal(&self, id: NodeId) -> bool {
        self.terminals.contains(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.graph.node_weight(id.to_index())
    }

    pub fn node_kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(NodeId::from_index)
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.graph.edge_indices().map(EdgeId::from_index)
    }

    pub fn edge_endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.graph
            .edge_endpoints(id.to_index())
            .map(|(a, b)| (NodeId::from_index(a), NodeId::from_index(b)))
    }

    pub fn edge_type(&self, id: EdgeId) -> Option<EdgeType> {
        self.graph.edge_weight(id.to_index()).map(|e| e.edge_type)
    }

    /// Outgoing edges from `id`, in insertion order, excluding `continue`
    /// edges when `include_continue` is false (the non-continue graph used
    /// by most CFG utilities, §4.2 "Algorithmic notes").
    pub fn outgoing(&self, id: NodeId, include_continue: bool) -> Vec<EdgeId> {
        self.graph
            .edges(id.to_index())
            .filter(|e| include_continue || e.weight().edge_type != EdgeType::Continue)
            .map(|e| EdgeId::from_index(e.id()))
            .collect()
    }

    pub fn incoming(&self, id: NodeId, include_continue: bool) -> Vec<EdgeId> {
        self.graph
            .edges_directed(id.to_index(), petgraph::Direction::Incoming)
            .filter(|e| include_continue || e.weight().edge_type != EdgeType::Continue)
            .map(|e| EdgeId::from_index(e.id()))
            .collect()
    }

    pub fn successors(&self, id: NodeId, include_continue: bool) -> Vec<NodeId> {
        self.outgoing(id, include_continue)
            .into_iter()
            .filter_map(|e| self.edge_endpoints(e).map(|(_, to)| to))
            .collect()
    }

    pub fn predecessors(&self, id: NodeId, include_continue: bool) -> Vec<NodeId> {
        self.incoming(id, include_continue)
            .into_iter()
            .filter_map(|e| self.edge_endpoints(e).map(|(from, _)| from))
            .collect()
    }

    pub(crate) fn graph(&self) -> &DiGraph<NodeData, EdgeData> {
        &self.graph
    }

    /// Export to the canonical document shape used for JSON round-trips.
    pub fn to_document(&self) -> CfgDocument {
        let nodes = self
            .node_ids()
            .map(|id| {
                let data = self.node(id).unwrap();
                NodeRecord {
                    id,
                    kind: data.kind.clone(),
                    span: data.span,
                }
            })
            .collect();
        let edges = self
            .edge_ids()
            .map(|id| {
                let (from, to) = self.edge_endpoints(id).unwrap();
                EdgeRecord {
                    id,
                    from,
                    to,
                    edge_type: self.edge_type(id).unwrap(),
                }
            })
            .collect();
        CfgDocument {
            protocol_name: self.protocol_name.clone(),
            roles: self.roles.clone(),
            initial_node: self.initial,
            terminal_nodes: self.terminals.iter().copied().collect(),
            nodes,
            edges,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_document())
    }

    pub fn from_document(doc: CfgDocument) -> Self {
        let mut graph = DiGraph::new();
        for record in &doc.nodes {
            let idx = graph.add_node(NodeData {
                kind: record.kind.clone(),
                span: record.span,
            });
            debug_assert_eq!(idx.index() as u32, record.id.0);
        }
        for record in &doc.edges {
            graph.add_edge(
                record.from.to_index(),
                record.to.to_index(),
                EdgeData {
                    edge_type: record.edge_type,
                },
            );
        }
        Cfg {
            protocol_name: doc.protocol_name,
            roles: doc.roles,
            graph,
            initial: doc.initial_node,
            terminals: doc.terminal_nodes.into_iter().collect(),
            update_bodies: BTreeMap::new(),
        }
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        let doc: CfgDocument = serde_json::from_str(s)?;
        Ok(Self::from_document(doc))
    }
}
