use mutspec_ast::{BinOp, Expr, Type};
use mutspec_core::{ExpressionCandidate, Outcome, SearchState};
use proptest::prelude::*;

fn atom(k: i64) -> ExpressionCandidate {
    ExpressionCandidate::atom(Expr::binary(BinOp::Gt, Expr::var("x", Type::Int), Expr::int(k)))
}

fn pool(atoms: usize) -> SearchState {
    let mut s = SearchState::new(true, false);
    s.admit_seed(ExpressionCandidate::new(Expr::bool(true), 0));
    for k in 0..atoms {
        s.admit(atom(k as i64));
    }
    s
}

proptest! {
    #[test]
    fn readmission_never_duplicates(picks in prop::collection::vec(0i64..6, 1..20)) {
        let mut s = pool(0);
        for &k in &picks {
            let first = s.admit(atom(k));
            let again = s.admit(atom(k));
            prop_assert_eq!(first, again);
        }
        let mut distinct = picks.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(s.len(), distinct.len() + 1);
        let mut strings: Vec<String> = (1..s.len()).filter_map(|i| s.bit_string(i)).collect();
        strings.sort();
        strings.dedup();
        prop_assert_eq!(strings.len(), distinct.len());
    }

    #[test]
    fn incorrect_candidate_is_never_combined(n in 2usize..7, bad in 1usize..7) {
        let mut s = pool(n);
        let bad = 1 + (bad - 1) % n;
        s.record(bad, Outcome::IncorrectProof);
        for j in 0..s.len() {
            prop_assert!(!s.is_worth_combining(bad, j));
            prop_assert!(!s.is_worth_combining(j, bad));
        }
    }

    #[test]
    fn negation_partners_never_share_a_combination(
        n in 3usize..7,
        a in 1usize..7,
        b in 1usize..7,
        rounds in 1usize..4,
    ) {
        let mut s = pool(n);
        let (a, b) = (1 + (a - 1) % n, 1 + (b - 1) % n);
        prop_assume!(a != b);
        s.record_negation(a, b);
        let (bit_a, bit_b) = (a - 1, b - 1);
        let mut prev = 1..s.len();
        for _ in 0..rounds {
            prev = s.next_depth(prev);
        }
        for i in 0..s.len() {
            let bits = s.bits(i).cloned().unwrap_or_default();
            prop_assert!(!(bits.get(bit_a) && bits.get(bit_b)), "index {} holds both partners", i);
        }
    }
}
