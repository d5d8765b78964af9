//! Tunables for the bounded analyses (§5, §8): trace-enumeration depth,
//! the bisimulation state-pair cap, and the dynamic-participant bound used
//! when DMst protocols are unfolded for trace checking.

use serde::{Deserialize, Serialize};

/// Options for `project`/`project_all` (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Run the supplementary CFSM minimization pass (§4.8) after projection.
    /// Off by default: it does not change projection semantics, only the
    /// resulting CFSM's state count.
    pub minimize: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        ProjectionConfig { minimize: false }
    }
}

/// Options for [`crate::bisim::bisimilar`] (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisimulationConfig {
    /// Maximum number of distinct state pairs explored before giving up with
    /// `BisimulationError::BoundExceeded`.
    pub max_state_pairs: usize,
}

impl Default for BisimulationConfig {
    fn default() -> Self {
        BisimulationConfig {
            max_state_pairs: 100_000,
        }
    }
}

/// Options for bounded trace enumeration/equivalence and liveness checking
/// (§4.6, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Maximum recursion unfolding depth when enumerating traces.
    pub max_depth: usize,
    /// Upper bound on the number of dynamically created participants
    /// considered per DMst role type (§4.7).
    pub max_dynamic_participants: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            max_depth: 2,
            max_dynamic_participants: 4,
        }
    }
}

/// Aggregate configuration threaded through the top-level API functions
/// (§6.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub projection: ProjectionConfig,
    pub bisimulation: BisimulationConfig,
    pub trace: TraceConfig,
}
