//! List- and set-based value enumeration.
//!
//! Values come from a `<id>.values` configuration list. Each entry is either
//! a numeric literal or a local-variable/field name resolved against the
//! frame that reached the decision point, optionally with a leading sign.
//! Values are resolved once at construction so successive `next_choice`
//! calls within one transition cannot observe different values.

use crate::generator::{check_index, CgBase, Choice, ChoiceError, ChoiceGenerator, ChoiceResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use tracing::debug;
use vmck_kernel::{Config, StackFrame};

fn split_sign(spec: &str) -> (i64, &str) {
    match spec.as_bytes().first() {
        Some(b'+') => (1, &spec[1..]),
        Some(b'-') => (-1, &spec[1..]),
        _ => (1, spec),
    }
}

fn parse_int_spec(id: &str, spec: &str, frame: Option<&StackFrame>) -> ChoiceResult<i64> {
    let (sign, body) = split_sign(spec);
    if body.is_empty() {
        return Err(ChoiceError::BadValueSpec {
            id: id.to_string(),
            spec: spec.to_string(),
        });
    }

    if body.as_bytes()[0].is_ascii_digit() {
        let v: i64 = body.parse().map_err(|_| ChoiceError::BadValueSpec {
            id: id.to_string(),
            spec: spec.to_string(),
        })?;
        Ok(sign * v)
    } else {
        let frame = frame.ok_or_else(|| ChoiceError::UnknownVariable {
            id: id.to_string(),
            name: body.to_string(),
        })?;
        let v = frame
            .local_or_field_value(body)
            .ok_or_else(|| ChoiceError::UnknownVariable {
                id: id.to_string(),
                name: body.to_string(),
            })?;
        Ok(sign * v)
    }
}

fn parse_double_spec(id: &str, spec: &str, frame: Option<&StackFrame>) -> ChoiceResult<f64> {
    let (sign, body) = split_sign(spec);
    if body.is_empty() {
        return Err(ChoiceError::BadValueSpec {
            id: id.to_string(),
            spec: spec.to_string(),
        });
    }

    if body.as_bytes()[0].is_ascii_digit() || body.as_bytes()[0] == b'.' {
        let v: f64 = body.parse().map_err(|_| ChoiceError::BadValueSpec {
            id: id.to_string(),
            spec: spec.to_string(),
        })?;
        Ok(sign as f64 * v)
    } else {
        let frame = frame.ok_or_else(|| ChoiceError::UnknownVariable {
            id: id.to_string(),
            name: body.to_string(),
        })?;
        let v = frame
            .local_or_field_value(body)
            .ok_or_else(|| ChoiceError::UnknownVariable {
                id: id.to_string(),
                name: body.to_string(),
            })?;
        Ok(sign as f64 * v as f64)
    }
}

/// Ordered enumeration of a fixed integer list.
#[derive(Debug, Clone)]
pub struct IntChoiceFromList {
    base: CgBase,
    values: Vec<i64>,
    count: i64,
}

impl IntChoiceFromList {
    pub fn new(id: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            base: CgBase::new(id),
            values,
            count: -1,
        }
    }

    /// Build from `<id>.values`, resolving variable specs against `frame`.
    pub fn from_config(config: &Config, id: &str, frame: Option<&StackFrame>) -> ChoiceResult<Self> {
        let specs = config.required_list(&format!("{id}.values"))?;
        let values = specs
            .iter()
            .map(|s| parse_int_spec(id, s, frame))
            .collect::<ChoiceResult<Vec<_>>>()?;
        debug!(id, n = values.len(), "int list choice generator");
        Ok(Self::new(id, values))
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

impl ChoiceGenerator for IntChoiceFromList {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count >= 0 && (self.count as usize) < self.values.len() {
            Some(Choice::Int(self.values[self.count as usize]))
        } else {
            None
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.values.len() as u64)?;
        Ok(Choice::Int(self.values[index as usize]))
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

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        let mut values = self.values.clone();
        values.shuffle(rng);
        Box::new(Self::new(self.base.id.clone(), values))
    }

    fn supports_reordering(&self) -> bool {
        true
    }

    fn reorder(
        &self,
        comparator: &dyn Fn(&Choice, &Choice) -> Ordering,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        let mut values = self.values.clone();
        values.sort_by(|a, b| comparator(&Choice::Int(*a), &Choice::Int(*b)));
        Ok(Box::new(Self::new(self.base.id.clone(), values)))
    }
}

/// Like [`IntChoiceFromList`] but deduplicated before the array is frozen.
/// Dedup is O(n²); choice sets are small.
#[derive(Debug, Clone)]
pub struct IntChoiceFromSet {
    inner: IntChoiceFromList,
}

impl IntChoiceFromSet {
    pub fn new(id: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            inner: IntChoiceFromList::new(id, dedup(values)),
        }
    }

    pub fn from_config(config: &Config, id: &str, frame: Option<&StackFrame>) -> ChoiceResult<Self> {
        let list = IntChoiceFromList::from_config(config, id, frame)?;
        Ok(Self {
            inner: IntChoiceFromList::new(id, dedup(list.values)),
        })
    }

    pub fn values(&self) -> &[i64] {
        self.inner.values()
    }
}

fn dedup(values: Vec<i64>) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

impl ChoiceGenerator for IntChoiceFromSet {
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

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        self.inner.randomize(rng)
    }

    fn supports_reordering(&self) -> bool {
        true
    }

    fn reorder(
        &self,
        comparator: &dyn Fn(&Choice, &Choice) -> Ordering,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        self.inner.reorder(comparator)
    }
}

/// Ordered enumeration of a fixed double list.
#[derive(Debug, Clone)]
pub struct DoubleChoiceFromList {
    base: CgBase,
    values: Vec<f64>,
    count: i64,
}

impl DoubleChoiceFromList {
    pub fn new(id: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            base: CgBase::new(id),
            values,
            count: -1,
        }
    }

    pub fn from_config(config: &Config, id: &str, frame: Option<&StackFrame>) -> ChoiceResult<Self> {
        let specs = config.required_list(&format!("{id}.values"))?;
        let values = specs
            .iter()
            .map(|s| parse_double_spec(id, s, frame))
            .collect::<ChoiceResult<Vec<_>>>()?;
        debug!(id, n = values.len(), "double list choice generator");
        Ok(Self::new(id, values))
    }
}

impl ChoiceGenerator for DoubleChoiceFromList {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count >= 0 && (self.count as usize) < self.values.len() {
            Some(Choice::Double(self.values[self.count as usize]))
        } else {
            None
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.values.len() as u64)?;
        Ok(Choice::Double(self.values[index as usize]))
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

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        let mut values = self.values.clone();
        values.shuffle(rng);
        Box::new(Self::new(self.base.id.clone(), values))
    }

    fn supports_reordering(&self) -> bool {
        true
    }

    fn reorder(
        &self,
        comparator: &dyn Fn(&Choice, &Choice) -> Ordering,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        let mut values = self.values.clone();
        values.sort_by(|a, b| comparator(&Choice::Double(*a), &Choice::Double(*b)));
        Ok(Box::new(Self::new(self.base.id.clone(), values)))
    }
}

/// Two-valued boolean enumeration. `cg.boolean.false_first` (default true)
/// controls enumeration order.
#[derive(Debug, Clone)]
pub struct BooleanChoiceGenerator {
    base: CgBase,
    values: [bool; 2],
    count: i64,
}

impl BooleanChoiceGenerator {
    pub fn new(id: impl Into<String>, false_first: bool) -> Self {
        let values = if false_first {
            [false, true]
        } else {
            [true, false]
        };
        Self {
            base: CgBase::new(id),
            values,
            count: -1,
        }
    }

    pub fn from_config(config: &Config, id: &str) -> ChoiceResult<Self> {
        let false_first = config.bool_or("cg.boolean.false_first", true)?;
        Ok(Self::new(id, false_first))
    }
}

impl ChoiceGenerator for BooleanChoiceGenerator {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count >= 0 && self.count < 2 {
            Some(Choice::Bool(self.values[self.count as usize]))
        } else {
            None
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, 2)?;
        Ok(Choice::Bool(self.values[index as usize]))
    }

    fn advance(&mut self) {
        if self.count < 1 {
            self.count += 1;
        }
    }

    fn has_more_choices(&self) -> bool {
        !self.base.done && self.count < 1
    }

    fn reset(&mut self) {
        self.count = -1;
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        2
    }

    fn processed_choices(&self) -> u64 {
        (self.count + 1) as u64
    }

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        use rand::Rng;
        let mut cg = self.clone();
        if rng.gen() {
            cg.values.swap(0, 1);
        }
        Box::new(cg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmck_kernel::MethodId;

    fn drain(cg: &mut dyn ChoiceGenerator) -> Vec<Choice> {
        let mut out = Vec::new();
        while cg.has_more_choices() {
            cg.advance();
            out.push(cg.next_choice().unwrap());
        }
        out
    }

    #[test]
    fn list_enumeration_order() {
        let mut cg = IntChoiceFromList::new("x", vec![5, 1, 9]);
        assert_eq!(cg.next_choice(), None);
        assert_eq!(
            drain(&mut cg),
            vec![Choice::Int(5), Choice::Int(1), Choice::Int(9)]
        );
        assert_eq!(cg.processed_choices(), cg.total_choices());

        // advancing past exhaustion never changes the current choice
        let last = cg.next_choice();
        cg.advance();
        cg.advance();
        assert_eq!(cg.next_choice(), last);
    }

    #[test]
    fn set_dedup() {
        let cg = IntChoiceFromSet::new("x", vec![3, 3, 1, 2]);
        assert_eq!(cg.total_choices(), 3);
        assert_eq!(cg.values(), &[3, 1, 2]);
    }

    #[test]
    fn reset_reproduces_sequence() {
        let mut cg = IntChoiceFromList::new("x", vec![4, 2, 7]);
        let first = drain(&mut cg);
        cg.reset();
        assert_eq!(drain(&mut cg), first);
    }

    #[test]
    fn spec_parsing() {
        let cfg: Config = [("c.values", "1,-2,+3,n")].into_iter().collect();
        let mut frame = StackFrame::new(MethodId(0), Some(0));
        frame.push_local("n", 17);

        let cg = IntChoiceFromList::from_config(&cfg, "c", Some(&frame)).unwrap();
        assert_eq!(cg.values(), &[1, -2, 3, 17]);
    }

    #[test]
    fn bad_specs_are_fatal() {
        let cfg: Config = [("c.values", "1,boom")].into_iter().collect();
        let err = IntChoiceFromList::from_config(&cfg, "c", None).unwrap_err();
        assert!(matches!(err, ChoiceError::UnknownVariable { .. }));

        let cfg: Config = [("c.values", "-")].into_iter().collect();
        let err = IntChoiceFromList::from_config(&cfg, "c", None).unwrap_err();
        assert!(matches!(err, ChoiceError::BadValueSpec { .. }));

        let cfg = Config::new();
        assert!(IntChoiceFromList::from_config(&cfg, "c", None).is_err());
    }

    #[test]
    fn index_out_of_range() {
        let cg = IntChoiceFromList::new("x", vec![1, 2]);
        assert!(cg.choice(1).is_ok());
        assert!(matches!(
            cg.choice(2),
            Err(ChoiceError::IndexOutOfRange { index: 2, total: 2 })
        ));
    }

    #[test]
    fn select_jumps_and_finishes() {
        let mut cg = IntChoiceFromList::new("x", vec![10, 20, 30]);
        cg.select(1).unwrap();
        assert_eq!(cg.next_choice(), Some(Choice::Int(20)));
        assert!(!cg.has_more_choices());
        assert!(cg.select(3).is_err());
    }

    #[test]
    fn boolean_order() {
        let mut cg = BooleanChoiceGenerator::new("b", true);
        assert_eq!(
            drain(&mut cg),
            vec![Choice::Bool(false), Choice::Bool(true)]
        );
    }
}
