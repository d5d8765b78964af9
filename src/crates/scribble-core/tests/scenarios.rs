//! End-to-end scenarios exercising the full pipeline: build, verify,
//! project, and relate the global and composed views.

mod common;

use common::*;
use scribble_core::config::TraceConfig;
use scribble_core::{build_cfg, project, project_all, verify, verify_liveness, verify_trace_equivalence};

/// Two-party ping-pong: the simplest protocol with no choice or recursion.
#[test]
fn s1_ping_pong_round_trips_through_the_whole_pipeline() {
    let body = seq(vec![msg("A", "B", "ping"), msg("B", "A", "pong")]);
    let proto = protocol("ping_pong", &["A", "B"], body);

    let cfg = build_cfg(&proto).expect("ping-pong lowers cleanly");
    let report = verify(&cfg);
    assert!(report.is_well_formed(), "{:?}", report.errors().collect::<Vec<_>>());

    let (cfsms, errors) = project_all(&cfg);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(cfsms.len(), 2);

    verify_trace_equivalence(&cfg, &cfsms, &TraceConfig::default())
        .expect("global and composed views of ping-pong agree");

    let liveness = verify_liveness(&cfsms, &TraceConfig::default());
    assert!(liveness.is_live(), "{:?}", liveness.violations);
}

/// A three-party order protocol: Buyer picks accept/reject, Seller only
/// tells Courier to ship on the accept branch.
#[test]
fn s2_three_party_choice_projects_for_every_role() {
    let body = choice(
        "Buyer",
        vec![
            seq(vec![
                msg("Buyer", "Seller", "accept"),
                msg("Seller", "Courier", "ship"),
            ]),
            msg("Buyer", "Seller", "reject"),
        ],
    );
    let proto = protocol("order", &["Buyer", "Seller", "Courier"], body);

    let cfg = build_cfg(&proto).expect("order protocol lowers cleanly");
    let report = verify(&cfg);
    assert!(report.is_well_formed(), "{:?}", report.errors().collect::<Vec<_>>());

    let (cfsms, errors) = project_all(&cfg);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(cfsms.len(), 3);
}

/// A streaming loop: Sender either emits more data and loops, or signals
/// completion and ends.
#[test]
fn s3_streaming_recursion_is_deadlock_and_stuck_free() {
    let body = recursion(
        "Stream",
        choice(
            "Sender",
            vec![
                seq(vec![msg("Sender", "Receiver", "data"), cont("Stream")]),
                seq(vec![msg("Sender", "Receiver", "done"), end()]),
            ],
        ),
    );
    let proto = protocol("stream", &["Sender", "Receiver"], body);

    let cfg = build_cfg(&proto).expect("streaming loop lowers cleanly");
    let report = verify(&cfg);
    assert!(report.is_well_formed(), "{:?}", report.errors().collect::<Vec<_>>());

    let (cfsms, errors) = project_all(&cfg);
    assert!(errors.is_empty(), "{errors:?}");

    let liveness = verify_liveness(&cfsms, &TraceConfig::default());
    assert!(liveness.is_live(), "{:?}", liveness.violations);
}

/// Two independent message exchanges running in parallel on disjoint
/// channels must not be flagged as racing or deadlocking.
#[test]
fn s4_parallel_fork_join_on_disjoint_channels_is_well_formed() {
    let body = parallel(vec![msg("A", "B", "left"), msg("C", "D", "right")]);
    let proto = protocol("split", &["A", "B", "C", "D"], body);

    let cfg = build_cfg(&proto).expect("parallel composition lowers cleanly");
    let report = verify(&cfg);
    assert!(report.is_well_formed(), "{:?}", report.errors().collect::<Vec<_>>());

    let (cfsms, errors) = project_all(&cfg);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(cfsms.len(), 4);
}

/// A choice whose branches share their first message label is never
/// deterministic and must be rejected at both verify and project time.
#[test]
fn s5_nondeterministic_choice_is_rejected() {
    let body = choice("A", vec![msg("A", "B", "go"), msg("A", "B", "go")]);
    let proto = protocol("ambiguous", &["A", "B"], body);

    let cfg = build_cfg(&proto).expect("structurally valid even though not well-formed");
    let report = verify(&cfg);
    assert!(!report.is_well_formed());
    assert!(report
        .errors()
        .any(|e| matches!(e, scribble_core::VerificationError::NonDeterministicChoice { .. })));

    let decider = role("A");
    let err = project(&cfg, &decider).expect_err("projection must refuse a non-deterministic choice");
    assert!(matches!(err, scribble_core::ProjectionError::P0Violation { .. }));
}

/// A DMst recursion label carries an independently-built update body, and
/// checking its safety never panics regardless of the outcome.
#[test]
fn s6_dmst_update_body_is_captured_and_checkable() {
    let body = recursion(
        "Stream",
        choice(
            "Sender",
            vec![
                seq(vec![
                    msg("Sender", "Receiver", "data"),
                    updatable_continue("Stream", msg("Sender", "Receiver", "resync")),
                ]),
                seq(vec![msg("Sender", "Receiver", "done"), end()]),
            ],
        ),
    );
    let proto = protocol("stream_update", &["Sender", "Receiver"], body);

    let cfg = build_cfg(&proto).expect("updatable streaming loop lowers cleanly");
    assert!(cfg.update_body("Stream").is_some());

    match scribble_core::check_safe_update(&cfg, "Stream") {
        Ok(()) => {}
        Err(e) => assert!(!e.reason.is_empty(), "a rejected update must explain why"),
    }
}
