//! Assertions for the algebraic laws of a [`Lattice`].
//!
//! Every helper checks the laws over all pairs (and triples) of the sample
//! elements and panics once with a report listing every violation.
//!
//! ```
//! use covenant_ir::ProofOutcome;
//! use covenant_test_utils::lattice::assert_finite_lattice_laws;
//!
//! assert_finite_lattice_laws(&[ProofOutcome::True, ProofOutcome::False]);
//! ```

use std::fmt::{Debug, Write};

use covenant_ir::{HasBottom, HasTop, Lattice};

fn report(violations: Vec<String>) {
    if violations.is_empty() {
        return;
    }
    let mut msg = format!("{} lattice law violation(s):\n", violations.len());
    for (i, v) in violations.iter().enumerate() {
        let _ = writeln!(msg, "  {}. {}", i + 1, v);
    }
    panic!("{msg}");
}

/// Join and meet are commutative, associative and idempotent, absorb each
/// other, and agree with `is_subseteq`.
pub fn assert_lattice_laws<L: Lattice + PartialEq + Debug>(elements: &[L]) {
    let mut violations = Vec::new();
    check_operator(elements, "join", L::join, &mut violations);
    check_operator(elements, "meet", L::meet, &mut violations);
    check_absorption(elements, &mut violations);
    check_ordering(elements, &mut violations);
    report(violations);
}

/// [`assert_lattice_laws`] plus the identity and annihilation laws of
/// `bottom()` and `top()`, which are added to the samples.
pub fn assert_finite_lattice_laws<L: HasBottom + HasTop + Clone + PartialEq + Debug>(
    elements: &[L],
) {
    let mut samples: Vec<L> = vec![L::bottom(), L::top()];
    samples.extend_from_slice(elements);
    let mut violations = Vec::new();
    check_operator(&samples, "join", L::join, &mut violations);
    check_operator(&samples, "meet", L::meet, &mut violations);
    check_absorption(&samples, &mut violations);
    check_ordering(&samples, &mut violations);
    check_extremes(&samples, &mut violations);
    report(violations);
}

fn check_operator<L: PartialEq + Debug>(
    elements: &[L],
    name: &str,
    op: impl Fn(&L, &L) -> L,
    v: &mut Vec<String>,
) {
    for a in elements {
        if op(a, a) != *a {
            v.push(format!("{name} not idempotent on {a:?}"));
        }
        for b in elements {
            if op(a, b) != op(b, a) {
                v.push(format!("{name} not commutative on {a:?}, {b:?}"));
            }
            for c in elements {
                if op(&op(a, b), c) != op(a, &op(b, c)) {
                    v.push(format!("{name} not associative on {a:?}, {b:?}, {c:?}"));
                }
            }
        }
    }
}

fn check_absorption<L: Lattice + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    for a in elements {
        for b in elements {
            if a.join(&a.meet(b)) != *a || a.meet(&a.join(b)) != *a {
                v.push(format!("absorption violated on {a:?}, {b:?}"));
            }
        }
    }
}

fn check_ordering<L: Lattice + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    for a in elements {
        for b in elements {
            let sub = a.is_subseteq(b);
            if sub != (a.join(b) == *b) {
                v.push(format!("{a:?} <= {b:?} is {sub} but join disagrees"));
            }
            if sub != (a.meet(b) == *a) {
                v.push(format!("{a:?} <= {b:?} is {sub} but meet disagrees"));
            }
        }
    }
}

fn check_extremes<L: HasBottom + HasTop + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    let (bot, top) = (L::bottom(), L::top());
    for x in elements {
        if !bot.is_subseteq(x) || bot.join(x) != *x || bot.meet(x) != bot {
            v.push(format!("bottom laws violated against {x:?}"));
        }
        if !x.is_subseteq(&top) || top.join(x) != top || top.meet(x) != *x {
            v.push(format!("top laws violated against {x:?}"));
        }
    }
}
