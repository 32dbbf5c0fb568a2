use std::collections::BTreeSet;
use rand::prelude::*;

use crate::check::ChangesetCheck;
use crate::compose::compose;
use crate::invert::invert;
use crate::node_change::NoNestedChanges;
use crate::prune::prune;
use crate::rebase::rebase;
use crate::revision::{RevisionIndexer, RevisionTag, TaggedChange};
use crate::sandbox::{random_change, Field, Node};

const R_INITIAL: RevisionTag = RevisionTag(0);
const R_SETUP: RevisionTag = RevisionTag(1);
const RA: RevisionTag = RevisionTag(2);
const RB: RevisionTag = RevisionTag(3);
const R_INVERSE: RevisionTag = RevisionTag(4);

/// A random field with some empty cells in it.
fn random_field(rng: &mut SmallRng) -> Field {
    let mut field = Field::new_with_nodes(R_INITIAL, rng.gen_range(0..8));
    let setup = random_change(&field, R_SETUP, true, rng);
    field.apply(&setup, Some(R_SETUP));
    field
}

fn metadata() -> RevisionIndexer {
    [R_INITIAL, R_SETUP, RA, RB, R_INVERSE].into_iter().collect()
}

fn applied(field: &Field, change: &[crate::mark::Mark<()>], revision: Option<RevisionTag>) -> Field {
    let mut result = field.clone();
    result.apply(change, revision);
    result
}

fn compose_fuzz(seed: u64, n: usize, verbose: bool) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let meta = metadata();

    for _i in 0..n {
        if verbose { println!("\n\ni {}", _i); }
        let field = random_field(&mut rng);
        let a = random_change(&field, RA, true, &mut rng);
        let after_a = applied(&field, &a, Some(RA));
        let b = random_change(&after_a, RB, true, &mut rng);
        let expected = applied(&after_a, &b, Some(RB));
        if verbose { dbg!(&field, &a, &b); }

        let composed = compose(&[TaggedChange::new(RA, a.clone()), TaggedChange::new(RB, b)], &NoNestedChanges, &meta);
        if verbose { dbg!(&composed); }
        composed.dbg_check();
        assert_eq!(applied(&field, &composed, None).content(), expected.content());

        // Composing a single change just tidies it up.
        assert_eq!(compose(&[TaggedChange::new(RA, a.clone())], &NoNestedChanges, &meta), prune(&a));
    }
}

#[test]
fn compose_fuzz_once() {
    compose_fuzz(123, 200, false);
}

#[test]
#[ignore]
fn compose_fuzz_forever() {
    for seed in 0.. {
        if seed % 10 == 0 { println!("seed {seed}"); }
        compose_fuzz(seed, 100, false);
    }
}

fn invert_fuzz(seed: u64, n: usize, verbose: bool) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let meta = metadata();

    for _i in 0..n {
        if verbose { println!("\n\ni {}", _i); }
        let field = random_field(&mut rng);
        let a = random_change(&field, RA, true, &mut rng);
        let after_a = applied(&field, &a, Some(RA));
        let tagged = TaggedChange::new(RA, a);
        if verbose { dbg!(&field, &tagged); }

        let inverse = invert(&tagged, Some(R_INVERSE), false, &NoNestedChanges);
        if verbose { dbg!(&inverse); }
        inverse.dbg_check();
        assert_eq!(applied(&after_a, &inverse, Some(R_INVERSE)).content(), field.content());

        let rollback = invert(&tagged, Some(R_INVERSE), true, &NoNestedChanges);
        assert_eq!(applied(&after_a, &rollback, Some(R_INVERSE)).content(), field.content());

        // A change followed by its inverse does nothing to the content.
        let round_trip = compose(&[tagged, TaggedChange::new(R_INVERSE, inverse)], &NoNestedChanges, &meta);
        round_trip.dbg_check();
        assert_eq!(applied(&field, &round_trip, None).content(), field.content());
    }
}

#[test]
fn invert_fuzz_once() {
    invert_fuzz(321, 200, false);
}

#[test]
#[ignore]
fn invert_fuzz_forever() {
    for seed in 0.. {
        if seed % 10 == 0 { println!("seed {seed}"); }
        invert_fuzz(seed, 100, false);
    }
}

fn content_set(field: &Field) -> BTreeSet<Node> {
    field.content().into_iter().collect()
}

fn rebase_fuzz(seed: u64, n: usize, with_moves: bool, verbose: bool) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let meta = metadata();

    for _i in 0..n {
        if verbose { println!("\n\ni {}", _i); }
        let field = random_field(&mut rng);
        let a = random_change(&field, RA, with_moves, &mut rng);
        let b = random_change(&field, RB, with_moves, &mut rng);
        let after_a = applied(&field, &a, Some(RA));
        let after_b = applied(&field, &b, Some(RB));
        if verbose { dbg!(&field, &a, &b); }

        let rebased = rebase(&b, &TaggedChange::new(RA, a), &NoNestedChanges, &meta);
        if verbose { dbg!(&rebased); }
        rebased.dbg_check();
        let result = applied(&after_a, &rebased, Some(RB)).content();

        // Everything either side kept, plus everything either side added.
        let initial = content_set(&field);
        let (set_a, set_b) = (content_set(&after_a), content_set(&after_b));
        let expected: BTreeSet<Node> = initial.iter()
            .filter(|n| set_a.contains(n) && set_b.contains(n))
            .chain(set_a.difference(&initial))
            .chain(set_b.difference(&initial))
            .copied()
            .collect();
        assert_eq!(result.len(), expected.len());
        assert_eq!(result.iter().copied().collect::<BTreeSet<_>>(), expected);

        // And both sides agree on the order of whatever they both see. Content both sides moved
        // can only end up where one of them put it.
        if !with_moves {
            for side in [&after_a, &after_b] {
                let side = side.content();
                let theirs: Vec<Node> = side.iter().filter(|n| expected.contains(n)).copied().collect();
                let ours: Vec<Node> = result.iter().filter(|n| side.contains(n)).copied().collect();
                assert_eq!(theirs, ours);
            }
        }

        // Rebasing over nothing only tidies the change up.
        assert_eq!(rebase(&b, &TaggedChange::new(RA, vec![]), &NoNestedChanges, &meta), prune(&b));
    }
}

#[test]
fn rebase_fuzz_once() {
    rebase_fuzz(1000, 200, false, false);
}

#[test]
fn rebase_moves_fuzz_once() {
    rebase_fuzz(2000, 200, true, false);
}

#[test]
#[ignore]
fn rebase_fuzz_forever() {
    for seed in 0.. {
        if seed % 10 == 0 { println!("seed {seed}"); }
        rebase_fuzz(seed, 100, seed % 2 == 0, false);
    }
}

/// Two peers make concurrent changes and each applies the other's change rebased over its own.
/// They must end up with the same content.
fn convergence_fuzz(seed: u64, n: usize, with_moves: bool, verbose: bool) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let meta = metadata();

    for _i in 0..n {
        if verbose { println!("\n\ni {}", _i); }
        let field = random_field(&mut rng);
        let a = random_change(&field, RA, with_moves, &mut rng);
        let b = random_change(&field, RB, with_moves, &mut rng);
        if verbose { dbg!(&field, &a, &b); }

        let b_over_a = rebase(&b, &TaggedChange::new(RA, a.clone()), &NoNestedChanges, &meta);
        let a_over_b = rebase(&a, &TaggedChange::new(RB, b.clone()), &NoNestedChanges, &meta);
        if verbose { dbg!(&b_over_a, &a_over_b); }

        let left = applied(&applied(&field, &a, Some(RA)), &b_over_a, Some(RB));
        let right = applied(&applied(&field, &b, Some(RB)), &a_over_b, Some(RA));
        if with_moves {
            // Content both peers moved ends up wherever the peer who moved it last put it.
            assert_eq!(content_set(&left), content_set(&right));
        } else {
            assert_eq!(left.content(), right.content());
        }
    }
}

#[test]
fn convergence_fuzz_once() {
    convergence_fuzz(3000, 200, false, false);
    convergence_fuzz(3001, 200, true, false);
}

#[test]
#[ignore]
fn convergence_fuzz_forever() {
    for seed in 0.. {
        if seed % 10 == 0 { println!("seed {seed}"); }
        convergence_fuzz(seed, 100, seed % 2 == 0, false);
    }
}

/// Undoing `a` after `b` was rebased over it must leave `b` as if `a` never happened.
fn undo_fuzz(seed: u64, n: usize, verbose: bool) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let meta = metadata();

    for _i in 0..n {
        if verbose { println!("\n\ni {}", _i); }
        let field = random_field(&mut rng);
        let a = random_change(&field, RA, false, &mut rng);
        let b = random_change(&field, RB, false, &mut rng);
        let expected = applied(&field, &b, Some(RB));
        if verbose { dbg!(&field, &a, &b); }

        let tagged = TaggedChange::new(RA, a.clone());
        let undo = invert(&tagged, Some(R_INVERSE), false, &NoNestedChanges);
        let b_over_a = rebase(&b, &tagged, &NoNestedChanges, &meta);
        let rebased = rebase(&b_over_a, &TaggedChange::new(R_INVERSE, undo.clone()), &NoNestedChanges, &meta);
        if verbose { dbg!(&undo, &b_over_a, &rebased); }
        rebased.dbg_check();

        let undone = applied(&applied(&field, &a, Some(RA)), &undo, Some(R_INVERSE));
        assert_eq!(applied(&undone, &rebased, Some(RB)).content(), expected.content());
    }
}

#[test]
fn undo_fuzz_once() {
    undo_fuzz(4000, 200, false);
}

#[test]
#[ignore]
fn undo_fuzz_forever() {
    for seed in 0.. {
        if seed % 10 == 0 { println!("seed {seed}"); }
        undo_fuzz(seed, 100, false);
    }
}

#[test]
fn prune_is_idempotent() {
    let mut rng = SmallRng::seed_from_u64(7);
    for _ in 0..200 {
        let field = random_field(&mut rng);
        let change = random_change(&field, RA, true, &mut rng);
        let pruned = prune(&change);
        assert_eq!(prune(&pruned), pruned);
        assert_eq!(applied(&field, &pruned, Some(RA)).content(), applied(&field, &change, Some(RA)).content());
    }
}
