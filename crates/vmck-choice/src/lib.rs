//! Choice enumeration for the vmck model checker.
//!
//! Every nondeterministic decision point — which runnable thread executes
//! next, which value a data choice takes — becomes an ordered, resumable,
//! backtrackable enumeration: a [`ChoiceGenerator`]. The search driver asks
//! the current generator for its next [`Choice`], runs the interpreter to the
//! next decision point, and on backtrack restores the generator's cursor and
//! advances it to the next alternative. The branching structure of the whole
//! search tree is defined here.

pub mod cascade;
pub mod generator;
pub mod interval;
pub mod list;
pub mod object;
pub mod permutation;
pub mod random;
pub mod registry;
pub mod thread;

pub use cascade::CascadedChoiceGenerator;
pub use generator::{CgBase, Choice, ChoiceError, ChoiceGenerator, ChoiceResult};
pub use interval::IntIntervalGenerator;
pub use list::{BooleanChoiceGenerator, DoubleChoiceFromList, IntChoiceFromList, IntChoiceFromSet};
pub use object::TypedObjectChoice;
pub use permutation::{PermutationCG, PermutationProducer, RandomPermutations, TotalPermutations};
pub use random::RandomIntIntervalGenerator;
pub use registry::CgRegistry;
pub use thread::{BreakGenerator, ExceptionThreadChoiceFromSet, ThreadChoiceFromSet};
