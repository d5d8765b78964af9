//! Compilation, verification and projection engine for multiparty session
//! type choreographies, including the Dynamically Updatable (DMst)
//! extension for protocols whose recursive body can be safely replaced at
//! runtime.
//!
//! # Quick Start
//!
//! ```ignore
//! use scribble_core::{ast::Protocol, build_cfg, verify, project_all};
//!
//! fn check(protocol: &Protocol) -> anyhow::Result<()> {
//!     let cfg = build_cfg(protocol)?;
//!     let report = verify(&cfg);
//!     if !report.is_well_formed() {
//!         for err in report.errors() {
//!             eprintln!("error: {err}");
//!         }
//!         anyhow::bail!("protocol is not well-formed");
//!     }
//!
//!     let (cfsms, errors) = project_all(&cfg);
//!     for err in errors {
//!         eprintln!("projection error: {err}");
//!     }
//!     println!("projected {} roles", cfsms.len());
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! 1. [`ast`] — the typed global-protocol syntax an external parser produces.
//! 2. [`cfg`] — [`build_cfg`] lowers a [`ast::Protocol`] into the normalized
//!    [`cfg::Cfg`] intermediate representation.
//! 3. [`verify`] — [`verify`] runs the full well-formedness battery over a
//!    built CFG.
//! 4. [`project`]/[`cfsm`] — [`project`] and [`project_all`] produce each
//!    role's [`cfsm::Cfsm`].
//! 5. [`combine`] — the ♢ operator composes two channel-disjoint CFGs.
//! 6. [`dmst`] — [`check_safe_update`] validates a DMst recursion update
//!    (Definition 14).
//! 7. [`lts`]/[`bisim`]/[`trace`] — [`bisimilar`], [`verify_trace_equivalence`]
//!    and [`verify_liveness`] relate the global protocol to its composed
//!    realization.

pub mod ast;
pub mod bisim;
pub mod cfg;
pub mod cfsm;
pub mod combine;
pub mod config;
pub mod dmst;
pub mod error;
pub mod lts;
pub mod project;
pub mod trace;
pub mod verify;

pub use cfg::Cfg;
pub use cfsm::Cfsm;
pub use config::{AnalysisConfig, BisimulationConfig, ProjectionConfig, TraceConfig};
pub use error::{
    BisimulationError, BuildError, CombineError, LivenessError, ProjectionError, SafeUpdateError,
    VerificationError,
};
pub use verify::VerificationReport;

use ast::{Protocol, Role};
use std::collections::BTreeMap;

/// Lower a parsed global protocol into its [`Cfg`] (§4.1).
pub fn build_cfg(protocol: &Protocol) -> Result<Cfg, BuildError> {
    cfg::builder::build_cfg(protocol)
}

/// Run every well-formedness check over a built CFG (§4.2).
pub fn verify(cfg: &Cfg) -> VerificationReport {
    verify::verify(cfg)
}

/// Project a CFG onto one role's [`Cfsm`] (§4.3).
pub fn project(cfg: &Cfg, role: &Role) -> Result<Cfsm, ProjectionError> {
    project::project(cfg, role)
}

/// Project a CFG onto every declared role, collecting per-role errors
/// instead of failing outright (§4.3, §6.1).
pub fn project_all(cfg: &Cfg) -> (BTreeMap<Role, Cfsm>, Vec<ProjectionError>) {
    project::project_all(cfg)
}

/// Sequentially compose two channel-disjoint CFGs via ♢ (§4.4).
pub fn combine(g1: &Cfg, g2: &Cfg) -> Result<Cfg, CombineError> {
    combine::combine(g1, g2)
}

/// Check that a DMst recursion label's declared update body yields a
/// well-formed 1-unfolding (§4.5 Definition 14).
pub fn check_safe_update(cfg: &Cfg, label: &str) -> Result<(), SafeUpdateError> {
    dmst::check_safe_update(cfg, label)
}

/// Decide weak bisimilarity of two [`lts::Lts`] views (§4.6).
pub fn bisimilar<A: lts::Lts, B: lts::Lts>(
    a: &A,
    b: &B,
    config: BisimulationConfig,
) -> Result<(), BisimulationError> {
    bisim::bisimilar(a, b, config)
}

/// Check that the global CFG and its composed per-role CFSMs agree on every
/// observable trace up to the configured depth bound (§4.6).
pub fn verify_trace_equivalence(
    cfg: &Cfg,
    cfsms: &BTreeMap<Role, Cfsm>,
    config: &TraceConfig,
) -> Result<(), BisimulationError> {
    trace::verify_trace_equivalence(cfg, cfsms, config)
}

/// Check the three liveness sub-properties over the composed system (§4.7).
pub fn verify_liveness(
    cfsms: &BTreeMap<Role, Cfsm>,
    config: &TraceConfig,
) -> trace::LivenessReport {
    trace::check_liveness_properties(cfsms, config)
}
