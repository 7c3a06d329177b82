//! The public serializer variants.
//!
//! All variants share one traversal engine and differ only in reference
//! encoding and scope:
//!
//! * [`FilteringSerializer`] — raw reference words. The cheapest variant,
//!   but images are only stable within one allocation history.
//! * [`CanonicalSerializer`] — canonical traversal-order numbering; the
//!   default for state matching.
//! * [`DebugSerializer`] — canonical plus a human-readable trace of each
//!   pass, for diagnosing unexpected state matches.
//! * [`AdaptiveSerializer`] — canonical, but shrinks scope (no statics,
//!   single hop) between scheduling points.
//! * [`TopFrameSerializer`] — canonical over topmost frames and their
//!   immediate referents only; the coarsest abstraction.

use crate::engine::{Engine, RefMode, Scope};
use crate::error::TraversalError;
use crate::filter::{AmmendmentRegistry, FilterConfiguration};
use crate::image::StateImage;
use tracing::info;
use vmck_kernel::{Config, ConfigError, KernelState};

/// A full-state fingerprinting pass.
///
/// Takes the kernel state by mutable reference: the pass scribbles traversal
/// bookkeeping (mark bits, canonical ids) into heap objects, and restores the
/// visible-state invariants before returning. Calling it twice on an
/// untouched state yields equal images.
pub trait StateSerializer {
    fn compute_state_image(&mut self, ks: &mut KernelState)
        -> Result<StateImage, TraversalError>;
}

/// Build the serializer selected by `serializer.class`, with the filter
/// chain selected by `filter.class`.
pub fn from_config(config: &Config) -> Result<Box<dyn StateSerializer>, ConfigError> {
    let filter = filter_from_config(config)?;
    let name = config.get("serializer.class").unwrap_or("canonical");
    info!(serializer = name, "serializer selected");
    Ok(match name {
        "filtering" => Box::new(FilteringSerializer::new(filter)),
        "canonical" => Box::new(CanonicalSerializer::new(filter)),
        "debug" => Box::new(DebugSerializer::new(filter)),
        "adaptive" => Box::new(AdaptiveSerializer::new(filter)),
        "top_frame" => Box::new(TopFrameSerializer::new(filter)),
        other => {
            return Err(ConfigError::UnknownImplementation {
                key: "serializer.class".into(),
                value: other.into(),
            })
        }
    })
}

fn filter_from_config(config: &Config) -> Result<FilterConfiguration, ConfigError> {
    match config.get("filter.class").unwrap_or("ammendable") {
        "ammendable" => FilterConfiguration::from_config(config, &AmmendmentRegistry::with_defaults()),
        "none" => Ok(FilterConfiguration::empty()),
        other => Err(ConfigError::UnknownImplementation {
            key: "filter.class".into(),
            value: other.into(),
        }),
    }
}

/// Direct-reference serializer.
pub struct FilteringSerializer {
    engine: Engine,
}

impl FilteringSerializer {
    pub fn new(filter: FilterConfiguration) -> Self {
        Self {
            engine: Engine::new(filter, RefMode::Direct, Scope::default(), false),
        }
    }
}

impl Default for FilteringSerializer {
    fn default() -> Self {
        Self::new(FilterConfiguration::standard())
    }
}

impl StateSerializer for FilteringSerializer {
    fn compute_state_image(
        &mut self,
        ks: &mut KernelState,
    ) -> Result<StateImage, TraversalError> {
        self.engine.compute(ks)
    }
}

/// Canonicalizing serializer; the state-matching default.
pub struct CanonicalSerializer {
    engine: Engine,
}

impl CanonicalSerializer {
    pub fn new(filter: FilterConfiguration) -> Self {
        Self {
            engine: Engine::new(filter, RefMode::Canonical, Scope::default(), false),
        }
    }
}

impl Default for CanonicalSerializer {
    fn default() -> Self {
        Self::new(FilterConfiguration::standard())
    }
}

impl StateSerializer for CanonicalSerializer {
    fn compute_state_image(
        &mut self,
        ks: &mut KernelState,
    ) -> Result<StateImage, TraversalError> {
        self.engine.compute(ks)
    }
}

/// Canonicalizing serializer that records a readable trace of each pass.
pub struct DebugSerializer {
    engine: Engine,
}

impl DebugSerializer {
    pub fn new(filter: FilterConfiguration) -> Self {
        Self {
            engine: Engine::new(filter, RefMode::Canonical, Scope::default(), true),
        }
    }

    /// Trace of the most recent pass; empty before the first call.
    pub fn last_dump(&self) -> &str {
        self.engine.last_dump().unwrap_or("")
    }
}

impl Default for DebugSerializer {
    fn default() -> Self {
        Self::new(FilterConfiguration::standard())
    }
}

impl StateSerializer for DebugSerializer {
    fn compute_state_image(
        &mut self,
        ks: &mut KernelState,
    ) -> Result<StateImage, TraversalError> {
        self.engine.compute(ks)
    }
}

/// Canonicalizing serializer with scheduling-point-dependent scope. At a
/// scheduling point it behaves like [`CanonicalSerializer`]; between
/// scheduling points it skips statics and expands only one hop from the
/// stack roots, trading match precision for speed where full precision
/// cannot change the search.
pub struct AdaptiveSerializer {
    engine: Engine,
}

impl AdaptiveSerializer {
    pub fn new(filter: FilterConfiguration) -> Self {
        let scope = Scope {
            adaptive: true,
            ..Scope::default()
        };
        Self {
            engine: Engine::new(filter, RefMode::Canonical, scope, false),
        }
    }
}

impl Default for AdaptiveSerializer {
    fn default() -> Self {
        Self::new(FilterConfiguration::standard())
    }
}

impl StateSerializer for AdaptiveSerializer {
    fn compute_state_image(
        &mut self,
        ks: &mut KernelState,
    ) -> Result<StateImage, TraversalError> {
        self.engine.compute(ks)
    }
}

/// Coarse abstraction serializer: topmost frames, their immediate referents,
/// no statics. States differing only deeper in the heap or further down the
/// stacks collapse into one image.
pub struct TopFrameSerializer {
    engine: Engine,
}

impl TopFrameSerializer {
    pub fn new(filter: FilterConfiguration) -> Self {
        let scope = Scope {
            statics: false,
            top_frame_only: true,
            hop_limit: Some(1),
            adaptive: false,
        };
        Self {
            engine: Engine::new(filter, RefMode::Canonical, scope, false),
        }
    }
}

impl Default for TopFrameSerializer {
    fn default() -> Self {
        Self::new(FilterConfiguration::standard())
    }
}

impl StateSerializer for TopFrameSerializer {
    fn compute_state_image(
        &mut self,
        ks: &mut KernelState,
    ) -> Result<StateImage, TraversalError> {
        self.engine.compute(ks)
    }
}
