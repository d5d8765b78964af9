//! Boundary conditions: degenerate protocols and the round-trip laws a
//! conforming JSON encoding must satisfy.

mod common;

use common::*;
use scribble_core::{build_cfg, project, verify};
use std::collections::BTreeSet;

#[test]
fn a_protocol_with_no_actions_is_reported_disconnected() {
    let proto = protocol("empty", &["A"], end());
    let cfg = build_cfg(&proto).expect("an empty body still lowers to a valid CFG");

    assert_eq!(cfg.node_count(), 2); // Initial + Terminal
    assert_eq!(cfg.terminals().count(), 1);

    let report = verify(&cfg);
    assert!(!report.is_well_formed());
    assert!(report
        .errors()
        .any(|e| matches!(e, scribble_core::VerificationError::Disconnected(_))));
}

#[test]
fn a_protocol_declaring_no_roles_is_rejected_at_build_time() {
    let proto = protocol("no_roles", &[], end());
    let err = build_cfg(&proto).expect_err("a roleless protocol cannot lower");
    assert!(matches!(err, scribble_core::BuildError::NoRoles));
}

#[test]
fn a_single_message_cfg_round_trips_through_json_unchanged() {
    let proto = protocol("single", &["A", "B"], msg("A", "B", "ping"));
    let cfg = build_cfg(&proto).unwrap();

    let json = cfg.to_json().expect("a built CFG always serializes");
    let restored = scribble_core::Cfg::from_json(&json).expect("the canonical encoding always parses back");

    assert_eq!(cfg.node_count(), restored.node_count());
    assert_eq!(cfg.edge_count(), restored.edge_count());
    assert_eq!(cfg.initial(), restored.initial());
    assert_eq!(
        cfg.terminals().collect::<BTreeSet<_>>(),
        restored.terminals().collect::<BTreeSet<_>>()
    );
    assert_eq!(cfg.protocol_name, restored.protocol_name);
    assert_eq!(cfg.roles, restored.roles);
}

#[test]
fn a_projected_cfsm_round_trips_through_json_unchanged() {
    let proto = protocol("single", &["A", "B"], msg("A", "B", "ping"));
    let cfg = build_cfg(&proto).unwrap();
    let cfsm = project(&cfg, &role("A")).unwrap();

    let json = cfsm.to_json().expect("a projected CFSM always serializes");
    let restored = scribble_core::Cfsm::from_json(&json).expect("the canonical encoding always parses back");

    assert_eq!(cfsm, restored);
}

#[test]
fn projecting_a_role_not_declared_on_the_protocol_fails() {
    let proto = protocol("single", &["A", "B"], msg("A", "B", "ping"));
    let cfg = build_cfg(&proto).unwrap();

    let err = project(&cfg, &role("Ghost")).expect_err("an undeclared role cannot be projected");
    assert!(matches!(err, scribble_core::ProjectionError::UnknownRole(_)));
}

#[test]
fn a_choice_with_a_single_branch_is_rejected_at_build_time() {
    let body = scribble_core::ast::Statement::Choice {
        at: role("A"),
        branches: vec![msg("A", "B", "only")],
        span: None,
    };
    let proto = protocol("degenerate_choice", &["A", "B"], body);

    let err = build_cfg(&proto).expect_err("a choice needs at least two branches");
    assert!(matches!(err, scribble_core::BuildError::EmptyChoice { .. }));
}

#[test]
fn a_message_with_no_receivers_is_rejected_at_build_time() {
    let body = scribble_core::ast::Statement::Message {
        from: role("A"),
        to: scribble_core::ast::Receivers::Many(vec![]),
        label: "orphan".to_string(),
        payload_type: None,
        span: None,
    };
    let proto = protocol("empty_multicast", &["A", "B"], body);

    let err = build_cfg(&proto).expect_err("a message needs at least one receiver");
    assert!(matches!(err, scribble_core::BuildError::EmptyMulticast { .. }));
}
