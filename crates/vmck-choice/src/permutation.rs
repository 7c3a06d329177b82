//! Permutation enumeration.
//!
//! Permutation choice sets can be factorial-sized, so the generator wraps a
//! lazy [`PermutationProducer`] instead of materializing all permutations up
//! front; only the current permutation is ever held in memory.

use crate::generator::{check_index, CgBase, Choice, ChoiceGenerator, ChoiceResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;

/// Lazy producer of permutations of `0..n`.
pub trait PermutationProducer {
    /// Number of permutations this producer will emit.
    fn total(&self) -> u64;

    /// Permutations emitted so far.
    fn processed(&self) -> u64;

    /// The permutation the cursor is on, or `None` before the first step.
    fn current(&self) -> Option<&[usize]>;

    fn has_next(&self) -> bool;

    /// Step to the next permutation; no-op once exhausted.
    fn step(&mut self);

    /// Back to the pre-enumeration position.
    fn rewind(&mut self);
}

/// `n!` saturating at `u64::MAX`.
fn factorial(n: usize) -> u64 {
    let mut f: u64 = 1;
    for i in 2..=n as u64 {
        f = f.saturating_mul(i);
    }
    f
}

/// In-place lexicographic successor; false when `perm` was the last one.
fn next_permutation(perm: &mut [usize]) -> bool {
    if perm.len() < 2 {
        return false;
    }
    let mut i = perm.len() - 1;
    while i > 0 && perm[i - 1] >= perm[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = perm.len() - 1;
    while perm[j] <= perm[i - 1] {
        j -= 1;
    }
    perm.swap(i - 1, j);
    perm[i..].reverse();
    true
}

/// All `n!` permutations of `0..n`, in lexicographic order.
#[derive(Debug, Clone)]
pub struct TotalPermutations {
    n: usize,
    perm: Vec<usize>,
    emitted: u64,
}

impl TotalPermutations {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            perm: Vec::new(),
            emitted: 0,
        }
    }
}

impl PermutationProducer for TotalPermutations {
    fn total(&self) -> u64 {
        factorial(self.n)
    }

    fn processed(&self) -> u64 {
        self.emitted
    }

    fn current(&self) -> Option<&[usize]> {
        if self.emitted == 0 {
            None
        } else {
            Some(&self.perm)
        }
    }

    fn has_next(&self) -> bool {
        self.emitted < self.total()
    }

    fn step(&mut self) {
        if !self.has_next() {
            return;
        }
        if self.emitted == 0 {
            self.perm = (0..self.n).collect();
        } else {
            next_permutation(&mut self.perm);
        }
        self.emitted += 1;
    }

    fn rewind(&mut self) {
        self.perm.clear();
        self.emitted = 0;
    }
}

/// A fixed number of seeded random permutations of `0..n`.
#[derive(Clone)]
pub struct RandomPermutations {
    n: usize,
    samples: u64,
    seed: u64,
    rng: StdRng,
    perm: Vec<usize>,
    emitted: u64,
}

impl RandomPermutations {
    pub fn new(n: usize, samples: u64, seed: u64) -> Self {
        Self {
            n,
            samples,
            seed,
            rng: StdRng::seed_from_u64(seed),
            perm: Vec::new(),
            emitted: 0,
        }
    }
}

impl fmt::Debug for RandomPermutations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomPermutations")
            .field("n", &self.n)
            .field("samples", &self.samples)
            .field("seed", &self.seed)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl PermutationProducer for RandomPermutations {
    fn total(&self) -> u64 {
        self.samples
    }

    fn processed(&self) -> u64 {
        self.emitted
    }

    fn current(&self) -> Option<&[usize]> {
        if self.emitted == 0 {
            None
        } else {
            Some(&self.perm)
        }
    }

    fn has_next(&self) -> bool {
        self.emitted < self.samples
    }

    fn step(&mut self) {
        if !self.has_next() {
            return;
        }
        self.perm = (0..self.n).collect();
        self.perm.shuffle(&mut self.rng);
        self.emitted += 1;
    }

    fn rewind(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.perm.clear();
        self.emitted = 0;
    }
}

/// Choice generator over a lazy permutation producer.
#[derive(Debug, Clone)]
pub struct PermutationCG<P: PermutationProducer + Clone + fmt::Debug> {
    base: CgBase,
    producer: P,
}

impl<P: PermutationProducer + Clone + fmt::Debug> PermutationCG<P> {
    pub fn new(id: impl Into<String>, producer: P) -> Self {
        Self {
            base: CgBase::new(id),
            producer,
        }
    }
}

impl<P: PermutationProducer + Clone + fmt::Debug + 'static> ChoiceGenerator for PermutationCG<P> {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        self.producer
            .current()
            .map(|p| Choice::Permutation(Arc::from(p)))
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.producer.total())?;
        // replay a fresh producer; the enumeration cursor stays untouched
        let mut replay = self.producer.clone();
        replay.rewind();
        for _ in 0..=index {
            replay.step();
        }
        Ok(Choice::Permutation(Arc::from(
            replay.current().expect("stepped producer has a current"),
        )))
    }

    fn advance(&mut self) {
        self.producer.step();
    }

    fn has_more_choices(&self) -> bool {
        !self.base.done && self.producer.has_next()
    }

    fn reset(&mut self) {
        self.producer.rewind();
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        self.producer.total()
    }

    fn processed_choices(&self) -> u64 {
        self.producer.processed()
    }

    fn randomize(&self, _rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        Box::new(self.clone())
    }
}
