//! Weak bisimulation between two [`Lts`] views (§4.6), decided by on-the-fly
//! partition refinement over a worklist of state pairs rather than building
//! the full product up front — the composed CFSM side can have a state
//! space too large to materialize for anything but small protocols.
//!
//! Two states are weakly bisimilar when, after closing over silent `tau`
//! steps, they agree on termination and every observable event leads back
//! to bisimilar states on both sides. The worklist is capped at
//! [`BisimulationConfig::max_state_pairs`] distinct pairs to keep the check
//! from diverging on protocols with unbounded interleaving.

use crate::config::BisimulationConfig;
use crate::error::{BisimulationError, Counterexample, DivergencePoint};
use crate::lts::{Lts, Step, TransitionEvent};
use std::collections::{HashMap, HashSet, VecDeque};

fn tau_closure<L: Lts>(lts: &L, start: &L::State) -> Vec<L::State> {
    let mut seen = vec![start.clone()];
    let mut worklist = VecDeque::from(vec![start.clone()]);
    while let Some(s) = worklist.pop_front() {
        for step in lts.transitions(&s) {
            if step.is_tau() && !seen.contains(&step.next) {
                seen.push(step.next.clone());
                worklist.push_back(step.next);
            }
        }
    }
    seen
}

fn observable_successors<L: Lts>(
    lts: &L,
    closure: &[L::State],
) -> HashMap<TransitionEvent, Vec<L::State>> {
    let mut out: HashMap<TransitionEvent, Vec<L::State>> = HashMap::new();
    for s in closure {
        for step in lts.transitions(s) {
            if let Some(event) = step.event {
                out.entry(event).or_default().push(step.next);
            }
        }
    }
    out
}

type Pair<A, B> = (<A as Lts>::State, <B as Lts>::State);

/// Decide weak bisimilarity of `a` and `b`, returning a [`Counterexample`]
/// through [`BisimulationError::NotBisimilar`] on mismatch.
#[tracing::instrument(skip(a, b, config))]
pub fn bisimilar<A: Lts, B: Lts>(
    a: &A,
    b: &B,
    config: BisimulationConfig,
) -> Result<(), BisimulationError> {
    let start: Pair<A, B> = (a.initial(), b.initial());
    let mut visited: HashSet<Pair<A, B>> = HashSet::new();
    let mut parent: HashMap<Pair<A, B>, (Pair<A, B>, TransitionEvent)> = HashMap::new();
    let mut worklist: VecDeque<Pair<A, B>> = VecDeque::new();
    visited.insert(start.clone());
    worklist.push_back(start);

    while let Some((p, q)) = worklist.pop_front() {
        if visited.len() > config.max_state_pairs {
            return Err(BisimulationError::BoundExceeded {
                limit: config.max_state_pairs,
            });
        }

        let closure_a = tau_closure(a, &p);
        let closure_b = tau_closure(b, &q);
        let a_final = closure_a.iter().any(|s| a.is_final(s));
        let b_final = closure_b.iter().any(|s| b.is_final(s));

        if a_final != b_final {
            return Err(BisimulationError::NotBisimilar {
                counterexample: build_counterexample::<A, B>(&parent, &(p, q), "<termination>"),
            });
        }

        let succ_a = observable_successors(a, &closure_a);
        let succ_b = observable_successors(b, &closure_b);

        let all_events: HashSet<&TransitionEvent> = succ_a.keys().chain(succ_b.keys()).collect();
        for event in all_events {
            let a_next = succ_a.get(event);
            let b_next = succ_b.get(event);
            match (a_next, b_next) {
                (Some(an), Some(bn)) => {
                    for pn in an {
                        for qn in bn {
                            let pair = (pn.clone(), qn.clone());
                            if visited.insert(pair.clone()) {
                                parent
                                    .insert(pair.clone(), ((p.clone(), q.clone()), event.clone()));
                                worklist.push_back(pair);
                            }
                        }
                    }
                }
                _ => {
                    return Err(BisimulationError::NotBisimilar {
                        counterexample: build_counterexample::<A, B>(
                            &parent,
                            &(p.clone(), q.clone()),
                            &format!("{event:?}"),
                        ),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny hand-rolled LTS over `u32` states: `transitions` is an
    /// explicit adjacency list so tests can build small, exact examples
    /// without going through a full CFG.
    struct TableLts {
        initial: u32,
        finals: Vec<u32>,
        edges: Vec<(u32, Option<TransitionEvent>, u32)>,
    }

    impl Lts for TableLts {
        type State = u32;

        fn initial(&self) -> u32 {
            self.initial
        }

        fn is_final(&self, state: &u32) -> bool {
            self.finals.contains(state)
        }

        fn transitions(&self, state: &u32) -> Vec<Step<u32>> {
            self.edges
                .iter()
                .filter(|(from, _, _)| from == state)
                .map(|(_, event, to)| Step {
                    event: event.clone(),
                    next: *to,
                })
                .collect()
        }
    }

    fn ping(to: &str) -> TransitionEvent {
        TransitionEvent::Message {
            from: "A".to_string(),
            to: to.to_string(),
            label: "ping".to_string(),
        }
    }

    #[test]
    fn identical_lts_are_bisimilar() {
        let lts = TableLts {
            initial: 0,
            finals: vec![1],
            edges: vec![(0, Some(ping("B")), 1)],
        };
        assert!(bisimilar(&lts, &lts, BisimulationConfig::default()).is_ok());
    }

    #[test]
    fn a_tau_prefix_does_not_break_bisimilarity() {
        let direct = TableLts {
            initial: 0,
            finals: vec![1],
            edges: vec![(0, Some(ping("B")), 1)],
        };
        let with_tau_prefix = TableLts {
            initial: 0,
            finals: vec![2],
            edges: vec![(0, None, 1), (1, Some(ping("B")), 2)],
        };
        assert!(bisimilar(&direct, &with_tau_prefix, BisimulationConfig::default()).is_ok());
    }

    #[test]
    fn a_missing_observable_event_is_reported_as_not_bisimilar() {
        let a = TableLts {
            initial: 0,
            finals: vec![1],
            edges: vec![(0, Some(ping("B")), 1)],
        };
        let b = TableLts {
            initial: 0,
            finals: vec![0],
            edges: vec![],
        };
        let err = bisimilar(&a, &b, BisimulationConfig::default()).unwrap_err();
        assert!(matches!(err, BisimulationError::NotBisimilar { .. }));
    }

    #[test]
    fn exceeding_the_state_pair_bound_is_reported() {
        let a = TableLts {
            initial: 0,
            finals: vec![1],
            edges: vec![(0, Some(ping("B")), 1)],
        };
        let tiny = BisimulationConfig { max_state_pairs: 0 };
        let err = bisimilar(&a, &a, tiny).unwrap_err();
        assert!(matches!(err, BisimulationError::BoundExceeded { .. }));
    }
}

fn build_counterexample<A: Lts, B: Lts>(
    parent: &HashMap<Pair<A, B>, (Pair<A, B>, TransitionEvent)>,
    divergence: &Pair<A, B>,
    unmatched_action: &str,
) -> Counterexample {
    let mut trace = Vec::new();
    let mut cur = divergence.clone();
    while let Some((prev, event)) = parent.get(&cur) {
        trace.push(format!("{event:?}"));
        cur = prev.clone();
    }
    trace.reverse();

    Counterexample {
        global_trace: trace.clone(),
        composed_trace: trace,
        divergence: DivergencePoint {
            global_state: format!("{:?}", divergence.0),
            composed_state: format!("{:?}", divergence.1),
            unmatched_action: unmatched_action.to_string(),
            message: format!(
                "no matching weak transition for event {unmatched_action} on both sides"
            ),
        },
    }
}
