//! The core [`ChoiceGenerator`] contract and the [`Choice`] value.

use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use vmck_kernel::{ConfigError, ObjRef, ThreadId};

/// One enumerated outcome of a nondeterministic decision point.
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    Int(i64),
    Double(f64),
    Bool(bool),
    Thread(ThreadId),
    Object(ObjRef),
    Permutation(Arc<[usize]>),
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Int(v) => write!(f, "{v}"),
            Choice::Double(v) => write!(f, "{v}"),
            Choice::Bool(v) => write!(f, "{v}"),
            Choice::Thread(t) => write!(f, "{t}"),
            Choice::Object(r) => write!(f, "{r}"),
            Choice::Permutation(p) => write!(f, "{p:?}"),
        }
    }
}

/// Choice-enumeration error. Construction-time configuration problems and
/// out-of-range index access are both fatal for the affected decision point;
/// there is no silent clamping or defaulting anywhere in this crate.
#[derive(Debug, Error)]
pub enum ChoiceError {
    #[error("choice index out of range: {index} (total {total})")]
    IndexOutOfRange { index: u64, total: u64 },

    #[error("interval generator '{id}' has delta 0")]
    ZeroDelta { id: String },

    #[error("no local or field '{name}' found for choice generator '{id}'")]
    UnknownVariable { id: String, name: String },

    #[error("illegal value spec '{spec}' for choice generator '{id}'")]
    BadValueSpec { id: String, spec: String },

    #[error("empty interval for random choice generator '{id}': [{min},{max})")]
    EmptyInterval { id: String, min: i64, max: i64 },

    #[error("duplicate choice generator kind '{kind}'")]
    DuplicateKind { kind: String },

    #[error("unknown choice generator kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("reordering not supported by choice generator '{id}'")]
    ReorderUnsupported { id: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ChoiceResult<T> = Result<T, ChoiceError>;

/// State shared by every generator: identity, done flag, cascade marker.
///
/// Generator structs embed this and delegate the corresponding trait methods
/// to it, so the per-family code only deals with its own cursor and values.
#[derive(Debug, Clone)]
pub struct CgBase {
    pub id: String,
    pub done: bool,
    pub cascaded: bool,
}

impl CgBase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            done: false,
            cascaded: false,
        }
    }
}

/// A resumable cursor over an ordered, finite (usually) set of choices.
///
/// The cursor starts *before* the first choice; each `advance` moves it one
/// search-tree edge forward. `reset` restores the pre-enumeration state
/// without touching the underlying choice set, which is what backtracking
/// relies on to reproduce the exact same sequence.
pub trait ChoiceGenerator: fmt::Debug {
    fn base(&self) -> &CgBase;
    fn base_mut(&mut self) -> &mut CgBase;

    /// The choice at the current cursor, or `None` if the cursor still
    /// precedes the first choice. Never fails: past exhaustion this keeps
    /// returning the last choice.
    fn next_choice(&self) -> Option<Choice>;

    /// Random-access lookup by absolute index.
    fn choice(&self, index: u64) -> ChoiceResult<Choice>;

    /// Move the cursor one step forward; capped once exhausted.
    fn advance(&mut self);

    fn has_more_choices(&self) -> bool;

    /// Restore the enumeration to its initial position. Safe to call
    /// repeatedly; must not reallocate the choice set.
    fn reset(&mut self);

    fn total_choices(&self) -> u64;

    fn processed_choices(&self) -> u64;

    /// Whether this generator's choices are candidate threads to run next.
    fn is_scheduling_point(&self) -> bool {
        false
    }

    /// A new generator over the same choice set in randomized order. Families
    /// without a meaningful order return an unchanged copy.
    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator>;

    fn supports_reordering(&self) -> bool {
        false
    }

    /// A new generator (same id) over the same choice set, sorted by the
    /// given comparator.
    fn reorder(
        &self,
        _comparator: &dyn Fn(&Choice, &Choice) -> Ordering,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        Err(ChoiceError::ReorderUnsupported {
            id: self.base().id.clone(),
        })
    }

    /// Jump directly to choice `index` and cut off further enumeration; used
    /// for trace replay.
    fn select(&mut self, index: u64) -> ChoiceResult<()> {
        let total = self.total_choices();
        if index >= total {
            return Err(ChoiceError::IndexOutOfRange { index, total });
        }
        self.reset();
        for _ in 0..=index {
            self.advance();
        }
        self.set_done();
        Ok(())
    }

    fn id(&self) -> &str {
        &self.base().id
    }

    fn is_done(&self) -> bool {
        self.base().done
    }

    /// Cut off further choice enumeration.
    fn set_done(&mut self) {
        self.base_mut().done = true;
    }

    /// Marks a generator that shares its decision point with a later one.
    fn is_cascaded(&self) -> bool {
        self.base().cascaded
    }

    fn set_cascaded(&mut self) {
        self.base_mut().cascaded = true;
    }
}

/// Bounds-check helper shared by the indexable families.
#[inline]
pub(crate) fn check_index(index: u64, total: u64) -> ChoiceResult<()> {
    if index < total {
        Ok(())
    } else {
        Err(ChoiceError::IndexOutOfRange { index, total })
    }
}
