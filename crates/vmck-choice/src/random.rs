//! Seeded random-subset enumeration.

use crate::generator::{check_index, CgBase, Choice, ChoiceError, ChoiceGenerator, ChoiceResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use vmck_kernel::Config;

/// Draws `n` independent values from `[min, max)` using a seeded generator.
///
/// Enumeration is deterministic for a given seed; `choice(i)` reconstructs
/// the value at an arbitrary index by replaying the seeded sequence from
/// scratch rather than relying on mutable replay state.
#[derive(Debug, Clone)]
pub struct RandomIntIntervalGenerator {
    base: CgBase,
    min: i64,
    max: i64,
    n: u64,
    seed: u64,
    rng: StdRng,
    next: i64,
    count: u64,
}

impl RandomIntIntervalGenerator {
    pub fn new(id: impl Into<String>, min: i64, max: i64, n: u64, seed: u64) -> ChoiceResult<Self> {
        let base = CgBase::new(id);
        if min >= max {
            return Err(ChoiceError::EmptyInterval {
                id: base.id,
                min,
                max,
            });
        }
        Ok(Self {
            base,
            min,
            max,
            n,
            seed,
            rng: StdRng::seed_from_u64(seed),
            next: 0,
            count: 0,
        })
    }

    /// Build from `<id>.min`, `<id>.max`, `<id>.n` and `<id>.seed`.
    pub fn from_config(config: &Config, id: &str) -> ChoiceResult<Self> {
        let min = config.int(&format!("{id}.min"))?;
        let max = config.int(&format!("{id}.max"))?;
        let n = config.int_or(&format!("{id}.n"), 1)? as u64;
        let seed = config.u64_or(&format!("{id}.seed"), 1)?;
        debug!(id, min, max, n, seed, "random int interval choice generator");
        Self::new(id, min, max, n, seed)
    }

    fn draw(rng: &mut StdRng, min: i64, max: i64) -> i64 {
        rng.gen_range(min..max)
    }
}

impl ChoiceGenerator for RandomIntIntervalGenerator {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count == 0 {
            None
        } else {
            Some(Choice::Int(self.next))
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.n)?;
        // replay from the seed; not efficient, but random access is only
        // used for replay and diagnostics
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut v = 0;
        for _ in 0..=index {
            v = Self::draw(&mut rng, self.min, self.max);
        }
        Ok(Choice::Int(v))
    }

    fn advance(&mut self) {
        if self.count < self.n {
            self.count += 1;
            self.next = Self::draw(&mut self.rng, self.min, self.max);
        }
    }

    fn has_more_choices(&self) -> bool {
        !self.base.done && self.count < self.n
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.count = 0;
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        self.n
    }

    fn processed_choices(&self) -> u64 {
        self.count
    }

    fn randomize(&self, _rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        // already a randomized enumeration
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(cg: &mut RandomIntIntervalGenerator) -> Vec<i64> {
        let mut out = Vec::new();
        while cg.has_more_choices() {
            cg.advance();
            match cg.next_choice().unwrap() {
                Choice::Int(v) => out.push(v),
                other => panic!("unexpected choice {other}"),
            }
        }
        out
    }

    #[test]
    fn seeded_and_in_range() {
        let mut cg = RandomIntIntervalGenerator::new("r", 10, 20, 8, 42).unwrap();
        let seq = drain(&mut cg);
        assert_eq!(seq.len(), 8);
        assert!(seq.iter().all(|v| (10..20).contains(v)));

        cg.reset();
        assert_eq!(drain(&mut cg), seq, "reset must replay the same sequence");
    }

    #[test]
    fn random_access_replays_from_seed() {
        let mut cg = RandomIntIntervalGenerator::new("r", 0, 100, 6, 7).unwrap();
        let seq = drain(&mut cg);
        // interleave out-of-order accesses to prove no replay state is kept
        assert_eq!(cg.choice(4).unwrap(), Choice::Int(seq[4]));
        assert_eq!(cg.choice(0).unwrap(), Choice::Int(seq[0]));
        assert_eq!(cg.choice(5).unwrap(), Choice::Int(seq[5]));
        assert!(cg.choice(6).is_err());
    }

    #[test]
    fn empty_interval_fatal() {
        assert!(matches!(
            RandomIntIntervalGenerator::new("r", 5, 5, 3, 0),
            Err(ChoiceError::EmptyInterval { .. })
        ));
    }
}
