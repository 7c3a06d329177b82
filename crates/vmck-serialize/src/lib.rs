//! State serialization for the vmck model checker.
//!
//! A serializer walks the full reachable program state — call stacks, static
//! storage, the heap object graph, thread/lock state — and produces a compact
//! integer fingerprint (the *state image*) that the external state store uses
//! to decide whether the current state was already explored. The
//! canonicalizing variants number heap objects in traversal order so that two
//! states with isomorphic reachable heaps serialize identically regardless of
//! raw allocation addresses, which is what drives heap-symmetry reduction.
//!
//! What goes into the image is governed by a [`FilterConfiguration`]: an
//! ordered chain of ammendments deciding per field and per frame what is
//! relevant to state matching.

mod engine;
pub mod error;
pub mod filter;
pub mod image;
mod masks;
pub mod serializer;

pub use error::TraversalError;
pub use filter::{Ammendment, AmmendmentRegistry, FilterConfiguration, FramePolicy};
pub use image::StateImage;
pub use serializer::{
    from_config, AdaptiveSerializer, CanonicalSerializer, DebugSerializer, FilteringSerializer,
    StateSerializer, TopFrameSerializer,
};
