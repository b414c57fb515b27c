use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use mutspec_ast::format_expr;
use tracing::{debug, trace};

use crate::candidate::ExpressionCandidate;
use crate::outcome::Outcome;

/// Growable bit-vector over the atomic candidates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn unit(bit: usize) -> Self {
        let mut s = BitSet::default();
        s.set(bit);
        s
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }

    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1 << (bit % 64)) != 0)
    }

    pub fn union(&self, other: &BitSet) -> BitSet {
        let len = self.words.len().max(other.words.len());
        let words = (0..len)
            .map(|i| {
                self.words.get(i).copied().unwrap_or(0) | other.words.get(i).copied().unwrap_or(0)
            })
            .collect();
        let mut out = BitSet { words };
        out.trim();
        out
    }

    pub fn ones(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for (w, word) in self.words.iter().enumerate() {
            for b in 0..64 {
                if word & (1 << b) != 0 {
                    out.push(w * 64 + b);
                }
            }
        }
        out
    }

    pub fn from_bits(bits: &[usize]) -> Self {
        let mut s = BitSet::default();
        for &b in bits {
            s.set(b);
        }
        s
    }

    /// `0`/`1` string of exactly `width` bits, lowest bit first.
    pub fn to_bit_string(&self, width: usize) -> String {
        (0..width)
            .map(|b| if self.get(b) { '1' } else { '0' })
            .collect()
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

/// Owned search state: the candidate pool, bit-vector identities, negation
/// partners and the per-candidate verdicts recorded between passes.
///
/// Index 0 is the unmodified seed and takes part in no combination. Atomic
/// candidates own one bit each; combinations carry the union of their parts.
#[derive(Debug, Default)]
pub struct SearchState {
    candidates: Vec<ExpressionCandidate>,
    bits: Vec<BitSet>,
    /// Printed expression -> pool index.
    by_text: HashMap<String, usize>,
    /// Bit-vector -> pool index.
    by_bits: HashMap<BitSet, usize>,
    /// Bit-vectors already turned into a combination.
    materialized: HashSet<BitSet>,
    negation: HashMap<usize, usize>,
    results: BTreeMap<usize, Outcome>,
    /// Atom bit -> pool index.
    atoms: Vec<usize>,
    /// Whether a failing subset rules out its supersets.
    prune_failed_subsets: bool,
    /// Treat `IncorrectProof` as still worth combining.
    retain_incorrect: bool,
}

impl SearchState {
    pub fn new(prune_failed_subsets: bool, retain_incorrect: bool) -> Self {
        Self {
            prune_failed_subsets,
            retain_incorrect,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Pool indices of the atomic candidates, in bit order.
    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn candidate(&self, index: usize) -> Option<&ExpressionCandidate> {
        self.candidates.get(index)
    }

    pub fn candidates(&self) -> &[ExpressionCandidate] {
        &self.candidates
    }

    pub fn bits(&self, index: usize) -> Option<&BitSet> {
        self.bits.get(index)
    }

    pub fn bit_string(&self, index: usize) -> Option<String> {
        self.bits
            .get(index)
            .map(|b| b.to_bit_string(self.atom_count()))
    }

    /// Admits the unmodified seed as index 0. Only valid on an empty pool.
    pub fn admit_seed(&mut self, seed: ExpressionCandidate) -> usize {
        debug_assert!(self.candidates.is_empty());
        self.insert(seed, BitSet::default())
    }

    /// Admits an atomic candidate and gives it the next free bit. Re-admitting a
    /// structurally identical expression returns its existing index.
    pub fn admit(&mut self, candidate: ExpressionCandidate) -> usize {
        if let Some(&existing) = self.by_text.get(&format_expr(&candidate.expr)) {
            return existing;
        }
        let bit = self.atoms.len();
        let index = self.insert(candidate, BitSet::unit(bit));
        self.atoms.push(index);
        self.by_bits.insert(BitSet::unit(bit), index);
        index
    }

    fn insert(&mut self, candidate: ExpressionCandidate, bits: BitSet) -> usize {
        let index = self.candidates.len();
        self.by_text.insert(format_expr(&candidate.expr), index);
        self.candidates.push(candidate);
        self.bits.push(bits);
        index
    }

    /// Records that atomic candidates `a` and `b` are logical negations of each other.
    pub fn record_negation(&mut self, a: usize, b: usize) {
        self.negation.insert(a, b);
        self.negation.insert(b, a);
    }

    pub fn negation_of(&self, index: usize) -> Option<usize> {
        self.negation.get(&index).copied()
    }

    pub fn record(&mut self, index: usize, outcome: Outcome) {
        self.results.insert(index, outcome);
    }

    pub fn result(&self, index: usize) -> Option<Outcome> {
        self.results.get(&index).copied()
    }

    pub fn results(&self) -> &BTreeMap<usize, Outcome> {
        &self.results
    }

    /// Verdicts that leave a candidate eligible for further combination.
    pub fn is_good(&self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Unknown | Outcome::CorrectProof | Outcome::CorrectProofByTimeout => true,
            Outcome::IncorrectProof => self.retain_incorrect,
            _ => false,
        }
    }

    fn index_is_good(&self, index: usize) -> bool {
        self.result(index).is_none_or(|o| self.is_good(o))
    }

    /// Decides whether conjoining `i` and `j` can produce something new and
    /// not already ruled out. Returns the combined bit-vector when it can.
    pub fn combination(&self, i: usize, j: usize) -> Option<BitSet> {
        if i == 0 || j == 0 || i >= self.len() || j >= self.len() {
            return None;
        }
        if !self.index_is_good(i) || !self.index_is_good(j) {
            return None;
        }
        let (bi, bj) = (&self.bits[i], &self.bits[j]);
        let combined = bi.union(bj);
        if &combined == bi || &combined == bj {
            return None;
        }
        if self.materialized.contains(&combined) || self.by_bits.contains_key(&combined) {
            return None;
        }
        let ones = combined.ones();
        for &bit in &ones {
            let partner = self.atoms.get(bit).and_then(|&a| self.negation_of(a));
            let partner_bit = partner.and_then(|p| self.atoms.iter().position(|&a| a == p));
            if partner_bit.is_some_and(|pb| combined.get(pb)) {
                trace!(i, j, "combination holds a negation pair");
                return None;
            }
        }
        if self.prune_failed_subsets && self.has_failed_subset(&ones) {
            trace!(i, j, "combination has a failed subset");
            return None;
        }
        Some(combined)
    }

    pub fn is_worth_combining(&self, i: usize, j: usize) -> bool {
        self.combination(i, j).is_some()
    }

    fn has_failed_subset(&self, ones: &[usize]) -> bool {
        let k = ones.len();
        // Combinations are bounded by the search depth; past this the subset
        // walk is skipped rather than enumerated.
        if k >= 24 {
            return false;
        }
        let full = (1u32 << k) - 1;
        for mask in 1..full {
            let subset: Vec<usize> = (0..k)
                .filter(|b| mask & (1 << b) != 0)
                .map(|b| ones[b])
                .collect();
            if let Some(&index) = self.by_bits.get(&BitSet::from_bits(&subset)) {
                if !self.index_is_good(index) {
                    return true;
                }
            }
        }
        false
    }

    /// Conjoins `i` and `j` into a new pool entry when the filter allows it.
    pub fn combine(&mut self, i: usize, j: usize) -> Option<usize> {
        let combined = self.combination(i, j)?;
        let candidate = self.candidates[i].conjoin(&self.candidates[j]);
        self.materialized.insert(combined.clone());
        if self.by_text.contains_key(&format_expr(&candidate.expr)) {
            return None;
        }
        let index = self.insert(candidate, combined.clone());
        self.by_bits.insert(combined, index);
        Some(index)
    }

    /// Pairs every candidate from the previous round with every atom and admits
    /// the combinations the filter allows. Returns the range of new indices.
    pub fn next_depth(&mut self, prev: Range<usize>) -> Range<usize> {
        let start = self.len();
        let atoms = self.atoms.clone();
        for i in prev {
            for &j in &atoms {
                self.combine(i, j);
            }
        }
        let end = self.len();
        debug!(new = end - start, "computed next depth");
        start..end
    }
}
