//! Property-based tests over randomly generated protocols, covering the
//! quantified invariants of the build/verify/project/combine pipeline
//! rather than any single fixed example.

mod common;

use common::*;
use proptest::prelude::*;
use scribble_core::ast::{Protocol, Statement};
use scribble_core::{build_cfg, combine, project, project_all, verify};
use std::collections::{BTreeSet, HashSet};

fn unique_labels() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,6}", 1..6).prop_filter("labels must be unique", |v| {
        let set: HashSet<_> = v.iter().collect();
        set.len() == v.len()
    })
}

fn chain_protocol(labels: &[String]) -> Protocol {
    let stmts: Vec<Statement> = labels.iter().map(|l| msg("A", "B", l)).collect();
    protocol("chain", &["A", "B"], seq(stmts))
}

proptest! {
    /// Any sequence of distinctly-labeled messages between two roles lowers
    /// to a well-formed CFG and projects cleanly for both roles.
    #[test]
    fn sequential_message_chains_are_always_well_formed(labels in unique_labels()) {
        let proto = chain_protocol(&labels);
        let cfg = build_cfg(&proto).expect("a sequence of messages always lowers");
        let report = verify(&cfg);
        prop_assert!(report.is_well_formed());

        let (cfsms, errors) = project_all(&cfg);
        prop_assert!(errors.is_empty());
        prop_assert_eq!(cfsms.len(), 2);
    }

    /// The canonical JSON document preserves node count, edge count, the
    /// initial node and the terminal set for any built CFG.
    #[test]
    fn cfg_json_round_trip_preserves_structure(labels in unique_labels()) {
        let proto = chain_protocol(&labels);
        let cfg = build_cfg(&proto).unwrap();
        let json = cfg.to_json().unwrap();
        let restored = scribble_core::Cfg::from_json(&json).unwrap();

        prop_assert_eq!(cfg.node_count(), restored.node_count());
        prop_assert_eq!(cfg.edge_count(), restored.edge_count());
        prop_assert_eq!(cfg.initial(), restored.initial());
        prop_assert_eq!(
            cfg.terminals().collect::<BTreeSet<_>>(),
            restored.terminals().collect::<BTreeSet<_>>()
        );
    }

    /// A projected CFSM's JSON encoding preserves its transition and state
    /// counts for any chain of distinctly-labeled messages.
    #[test]
    fn cfsm_json_round_trip_preserves_transition_count(labels in unique_labels()) {
        let proto = chain_protocol(&labels);
        let cfg = build_cfg(&proto).unwrap();
        let cfsm = project(&cfg, &role("A")).unwrap();
        let json = cfsm.to_json().unwrap();
        let restored = scribble_core::Cfsm::from_json(&json).unwrap();

        prop_assert_eq!(cfsm.transitions.len(), restored.transitions.len());
        prop_assert_eq!(cfsm.states.len(), restored.states.len());
    }

    /// A two-branch choice whose branches share a first message label is
    /// never well-formed, regardless of which label is chosen.
    #[test]
    fn duplicate_choice_labels_are_never_well_formed(label in "[a-z]{1,6}") {
        let body = choice("A", vec![msg("A", "B", &label), msg("A", "B", &label)]);
        let proto = protocol("dup", &["A", "B"], body);
        let cfg = build_cfg(&proto).unwrap();
        prop_assert!(!verify(&cfg).is_well_formed());
    }

    /// A two-branch choice with distinct first message labels always passes
    /// the determinism check.
    #[test]
    fn distinct_choice_labels_pass_determinism(label_a in "[a-z]{1,6}", label_b in "[a-z]{1,6}") {
        prop_assume!(label_a != label_b);
        let body = choice("A", vec![msg("A", "B", &label_a), msg("A", "B", &label_b)]);
        let proto = protocol("distinct", &["A", "B"], body);
        let cfg = build_cfg(&proto).unwrap();
        let report = verify(&cfg);
        let determinism_check = report
            .checks
            .iter()
            .find(|c| c.name == "choice_determinism")
            .expect("choice_determinism always runs");
        prop_assert!(determinism_check.pass);
    }

    /// Projecting any role absent from the protocol's declared role list
    /// always fails, no matter what the protocol's body looks like.
    #[test]
    fn projecting_an_undeclared_role_always_fails(labels in unique_labels()) {
        let proto = chain_protocol(&labels);
        let cfg = build_cfg(&proto).unwrap();
        let result = project(&cfg, &role("Ghost"));
        prop_assert!(result.is_err());
    }

    /// Two CFGs whose messages never share a (sender, receiver, label)
    /// channel always combine successfully.
    #[test]
    fn combine_of_channel_disjoint_cfgs_always_succeeds(label_a in "[a-z]{1,6}", label_b in "[a-z]{1,6}") {
        prop_assume!(label_a != label_b);
        let g1 = build_cfg(&protocol("g1", &["A", "B"], msg("A", "B", &label_a))).unwrap();
        let g2 = build_cfg(&protocol("g2", &["A", "B"], msg("A", "B", &label_b))).unwrap();
        prop_assert!(combine(&g1, &g2).is_ok());
    }

    /// Two CFGs that use the exact same channel always fail to combine.
    #[test]
    fn combine_of_conflicting_cfgs_always_fails(label in "[a-z]{1,6}") {
        let g1 = build_cfg(&protocol("g1", &["A", "B"], msg("A", "B", &label))).unwrap();
        let g2 = build_cfg(&protocol("g2", &["A", "B"], msg("A", "B", &label))).unwrap();
        let err = combine(&g1, &g2).expect_err("a shared channel must be rejected");
        prop_assert!(matches!(err, scribble_core::CombineError::ChannelConflict(_)));
    }
}
