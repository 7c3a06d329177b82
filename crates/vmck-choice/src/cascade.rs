//! Cascaded (compound) choice generators.

use crate::generator::{CgBase, Choice, ChoiceError, ChoiceGenerator, ChoiceResult};
use rand::rngs::StdRng;

/// A linked list of sub-generators treated as one logical enumeration.
///
/// `advance` works the current link until it is exhausted, then moves to the
/// next one; totals and processed counts aggregate across links up to and
/// including the current one. Sub-generators keep their own ids for replay.
#[derive(Debug)]
pub struct CascadedChoiceGenerator {
    base: CgBase,
    links: Vec<Box<dyn ChoiceGenerator>>,
    cur: usize,
}

impl CascadedChoiceGenerator {
    pub fn new(id: impl Into<String>, links: Vec<Box<dyn ChoiceGenerator>>) -> Self {
        assert!(!links.is_empty(), "cascade needs at least one link");
        let mut links = links;
        // every link but the last shares its decision point with a later one
        let n = links.len();
        for link in links.iter_mut().take(n.saturating_sub(1)) {
            link.set_cascaded();
        }
        Self {
            base: CgBase::new(id),
            links,
            cur: 0,
        }
    }

    pub fn links(&self) -> &[Box<dyn ChoiceGenerator>] {
        &self.links
    }

    /// The link whose choice is current.
    pub fn current_link(&self) -> Option<&dyn ChoiceGenerator> {
        self.links.get(self.cur).map(Box::as_ref)
    }
}

impl ChoiceGenerator for CascadedChoiceGenerator {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        self.links.get(self.cur).and_then(|g| g.next_choice())
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        let mut offset = 0;
        for link in &self.links {
            let n = link.total_choices();
            if index < offset + n {
                return link.choice(index - offset);
            }
            offset += n;
        }
        Err(ChoiceError::IndexOutOfRange {
            index,
            total: offset,
        })
    }

    fn advance(&mut self) {
        loop {
            let last_link = self.cur + 1 >= self.links.len();
            let link = &mut self.links[self.cur];
            if link.has_more_choices() {
                link.advance();
                return;
            }
            if last_link {
                // capped: the last link keeps its final choice current
                return;
            }
            self.cur += 1;
        }
    }

    fn has_more_choices(&self) -> bool {
        !self.base.done
            && self.links[self.cur..]
                .iter()
                .any(|g| g.has_more_choices())
    }

    fn reset(&mut self) {
        for link in &mut self.links {
            link.reset();
        }
        self.cur = 0;
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        self.links
            .iter()
            .take(self.cur + 1)
            .map(|g| g.total_choices())
            .sum()
    }

    fn processed_choices(&self) -> u64 {
        self.links
            .iter()
            .take(self.cur + 1)
            .map(|g| g.processed_choices())
            .sum()
    }

    fn is_scheduling_point(&self) -> bool {
        self.links.iter().any(|g| g.is_scheduling_point())
    }

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        let links = self.links.iter().map(|g| g.randomize(rng)).collect();
        Box::new(CascadedChoiceGenerator::new(self.base.id.clone(), links))
    }
}
