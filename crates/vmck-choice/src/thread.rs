//! Thread-schedule enumeration.

use crate::generator::{check_index, CgBase, Choice, ChoiceGenerator, ChoiceResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use vmck_kernel::ThreadId;

/// Enumerates a fixed set of runnable-thread handles.
///
/// `scheduling_point` is true unless the generator was constructed purely for
/// internal bookkeeping; the adaptive serializer and the search heuristics
/// both key off it.
#[derive(Debug, Clone)]
pub struct ThreadChoiceFromSet {
    base: CgBase,
    values: Vec<ThreadId>,
    count: i64,
    scheduling_point: bool,
}

impl ThreadChoiceFromSet {
    pub fn new(id: impl Into<String>, set: Vec<ThreadId>, scheduling_point: bool) -> Self {
        Self {
            base: CgBase::new(id),
            values: set,
            count: -1,
            scheduling_point,
        }
    }

    pub fn contains(&self, ti: ThreadId) -> bool {
        self.values.contains(&ti)
    }

    pub fn choices(&self) -> &[ThreadId] {
        &self.values
    }

    /// Typed reorder: a new generator (same id) over a sorted copy of the
    /// handle array.
    pub fn reorder_threads(
        &self,
        comparator: &dyn Fn(&ThreadId, &ThreadId) -> Ordering,
    ) -> ThreadChoiceFromSet {
        let mut values = self.values.clone();
        values.sort_by(comparator);
        ThreadChoiceFromSet::new(self.base.id.clone(), values, self.scheduling_point)
    }
}

impl ChoiceGenerator for ThreadChoiceFromSet {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count >= 0 && (self.count as usize) < self.values.len() {
            Some(Choice::Thread(self.values[self.count as usize]))
        } else {
            None
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.values.len() as u64)?;
        Ok(Choice::Thread(self.values[index as usize]))
    }

    fn advance(&mut self) {
        if self.count < self.values.len() as i64 - 1 {
            self.count += 1;
        }
    }

    fn has_more_choices(&self) -> bool {
        !self.base.done && self.count < self.values.len() as i64 - 1
    }

    fn reset(&mut self) {
        self.count = -1;
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        self.values.len() as u64
    }

    fn processed_choices(&self) -> u64 {
        (self.count + 1) as u64
    }

    fn is_scheduling_point(&self) -> bool {
        self.scheduling_point
    }

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        let mut values = self.values.clone();
        values.shuffle(rng);
        Box::new(ThreadChoiceFromSet::new(
            self.base.id.clone(),
            values,
            self.scheduling_point,
        ))
    }

    fn supports_reordering(&self) -> bool {
        true
    }

    fn reorder(
        &self,
        comparator: &dyn Fn(&Choice, &Choice) -> Ordering,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        Ok(Box::new(self.reorder_threads(&|a, b| {
            comparator(&Choice::Thread(*a), &Choice::Thread(*b))
        })))
    }
}

/// Thread schedule enumeration that additionally injects a fault.
///
/// The handle array is the runnable set plus one tail entry (the current
/// thread, scheduled once more); the tail entry carries the fault-class name,
/// so the last alternative explores "this operation raises the fault" on top
/// of every real schedule.
#[derive(Debug, Clone)]
pub struct ExceptionThreadChoiceFromSet {
    inner: ThreadChoiceFromSet,
    fault_class: String,
}

impl ExceptionThreadChoiceFromSet {
    pub fn new(
        id: impl Into<String>,
        runnables: Vec<ThreadId>,
        current: ThreadId,
        fault_class: impl Into<String>,
    ) -> Self {
        let mut values = runnables;
        values.push(current);
        Self {
            inner: ThreadChoiceFromSet::new(id, values, true),
            fault_class: fault_class.into(),
        }
    }

    /// The fault-class name, when the currently selected choice is the
    /// fault-injecting tail entry.
    pub fn fault_for_current_choice(&self) -> Option<&str> {
        if self.inner.count >= 0 && self.inner.count == self.inner.values.len() as i64 - 1 {
            Some(&self.fault_class)
        } else {
            None
        }
    }
}

impl ChoiceGenerator for ExceptionThreadChoiceFromSet {
    fn base(&self) -> &CgBase {
        self.inner.base()
    }

    fn base_mut(&mut self) -> &mut CgBase {
        self.inner.base_mut()
    }

    fn next_choice(&self) -> Option<Choice> {
        self.inner.next_choice()
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        self.inner.choice(index)
    }

    fn advance(&mut self) {
        self.inner.advance()
    }

    fn has_more_choices(&self) -> bool {
        self.inner.has_more_choices()
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn total_choices(&self) -> u64 {
        self.inner.total_choices()
    }

    fn processed_choices(&self) -> u64 {
        self.inner.processed_choices()
    }

    fn is_scheduling_point(&self) -> bool {
        true
    }

    fn randomize(&self, _rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        // the fault entry must stay at the tail, so the order is fixed
        Box::new(self.clone())
    }
}

/// Single fixed thread choice used purely to force a reschedule.
///
/// In terminal mode it represents end-of-execution: enumeration is
/// permanently disabled and the generator never offers an alternative.
#[derive(Debug, Clone)]
pub struct BreakGenerator {
    base: CgBase,
    thread: ThreadId,
    terminal: bool,
    count: i64,
}

impl BreakGenerator {
    pub fn new(id: impl Into<String>, thread: ThreadId, terminal: bool) -> Self {
        Self {
            base: CgBase::new(id),
            thread,
            terminal,
            count: -1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}

impl ChoiceGenerator for BreakGenerator {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count == 0 {
            Some(Choice::Thread(self.thread))
        } else {
            None
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, 1)?;
        Ok(Choice::Thread(self.thread))
    }

    fn advance(&mut self) {
        if !self.terminal && self.count < 0 {
            self.count = 0;
        }
    }

    fn has_more_choices(&self) -> bool {
        !self.terminal && !self.base.done && self.count < 0
    }

    fn reset(&mut self) {
        self.count = -1;
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        1
    }

    fn processed_choices(&self) -> u64 {
        (self.count + 1) as u64
    }

    fn is_scheduling_point(&self) -> bool {
        true
    }

    fn randomize(&self, _rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tids(ids: &[i32]) -> Vec<ThreadId> {
        ids.iter().map(|&i| ThreadId(i)).collect()
    }

    #[test]
    fn schedule_enumeration() {
        let mut cg = ThreadChoiceFromSet::new("sched", tids(&[0, 1, 2]), true);
        assert!(cg.is_scheduling_point());
        assert_eq!(cg.next_choice(), None);

        let mut seen = Vec::new();
        while cg.has_more_choices() {
            cg.advance();
            seen.push(cg.next_choice().unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Choice::Thread(ThreadId(0)),
                Choice::Thread(ThreadId(1)),
                Choice::Thread(ThreadId(2))
            ]
        );
        assert!(cg.contains(ThreadId(1)));
        assert!(!cg.contains(ThreadId(9)));
    }

    #[test]
    fn reorder_keeps_id_and_set() {
        let cg = ThreadChoiceFromSet::new("sched", tids(&[2, 0, 1]), true);
        let sorted = cg.reorder_threads(&|a, b| a.0.cmp(&b.0));
        assert_eq!(sorted.id(), "sched");
        assert_eq!(sorted.choices(), &tids(&[0, 1, 2])[..]);
        // original untouched
        assert_eq!(cg.choices(), &tids(&[2, 0, 1])[..]);
    }

    #[test]
    fn randomize_is_a_permutation_of_the_set() {
        use rand::SeedableRng;
        let cg = ThreadChoiceFromSet::new("sched", tids(&[0, 1, 2, 3, 4]), true);
        let mut rng = StdRng::seed_from_u64(11);
        let mut shuffled = cg.randomize(&mut rng);

        let mut seen = Vec::new();
        while shuffled.has_more_choices() {
            shuffled.advance();
            match shuffled.next_choice().unwrap() {
                Choice::Thread(t) => seen.push(t),
                other => panic!("unexpected choice {other}"),
            }
        }
        seen.sort();
        assert_eq!(seen, tids(&[0, 1, 2, 3, 4]));
        assert_eq!(shuffled.id(), "sched");
    }

    #[test]
    fn exception_tail_entry() {
        let mut cg = ExceptionThreadChoiceFromSet::new(
            "x",
            tids(&[1, 2]),
            ThreadId(0),
            "ArithmeticFault",
        );
        assert_eq!(cg.total_choices(), 3);

        cg.advance();
        assert_eq!(cg.fault_for_current_choice(), None);
        cg.advance();
        assert_eq!(cg.fault_for_current_choice(), None);
        cg.advance();
        assert_eq!(cg.next_choice(), Some(Choice::Thread(ThreadId(0))));
        assert_eq!(cg.fault_for_current_choice(), Some("ArithmeticFault"));
    }

    #[test]
    fn break_generator_single_choice() {
        let mut cg = BreakGenerator::new("break", ThreadId(3), false);
        assert!(cg.has_more_choices());
        cg.advance();
        assert_eq!(cg.next_choice(), Some(Choice::Thread(ThreadId(3))));
        assert!(!cg.has_more_choices());
        assert_eq!(cg.processed_choices(), 1);
    }

    #[test]
    fn terminal_break_never_offers_choices() {
        let mut cg = BreakGenerator::new("end", ThreadId(0), true);
        assert!(!cg.has_more_choices());
        cg.advance();
        assert!(!cg.has_more_choices());
        assert_eq!(cg.next_choice(), None);
    }
}
