//! String-keyed choice-generator factory registry.
//!
//! Decision points name a generator kind in configuration; the registry maps
//! each kind to a constructor closure, populated at startup. No runtime type
//! introspection anywhere: adding a generator family means registering one
//! closure.

use crate::generator::{ChoiceError, ChoiceGenerator, ChoiceResult};
use crate::interval::IntIntervalGenerator;
use crate::list::{BooleanChoiceGenerator, DoubleChoiceFromList, IntChoiceFromList, IntChoiceFromSet};
use crate::random::RandomIntIntervalGenerator;
use ahash::AHashMap;
use tracing::debug;
use vmck_kernel::Config;

/// Constructor closure: `(config, generator id) -> generator`.
pub type CgFactory = Box<dyn Fn(&Config, &str) -> ChoiceResult<Box<dyn ChoiceGenerator>>>;

/// Factory registry for configuration-driven generator construction.
pub struct CgRegistry {
    factories: AHashMap<String, CgFactory>,
}

impl CgRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: AHashMap::new(),
        }
    }

    /// Registry with the stock generator families registered.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        // frame-resolved value specs are not available through the registry
        // path; drivers that need them construct list generators directly
        reg.must_register("int_list", |cfg, id| {
            Ok(Box::new(IntChoiceFromList::from_config(cfg, id, None)?))
        });
        reg.must_register("int_set", |cfg, id| {
            Ok(Box::new(IntChoiceFromSet::from_config(cfg, id, None)?))
        });
        reg.must_register("double_list", |cfg, id| {
            Ok(Box::new(DoubleChoiceFromList::from_config(cfg, id, None)?))
        });
        reg.must_register("int_interval", |cfg, id| {
            Ok(Box::new(IntIntervalGenerator::from_config(cfg, id)?))
        });
        reg.must_register("random_int_interval", |cfg, id| {
            Ok(Box::new(RandomIntIntervalGenerator::from_config(cfg, id)?))
        });
        reg.must_register("boolean", |cfg, id| {
            Ok(Box::new(BooleanChoiceGenerator::from_config(cfg, id)?))
        });
        reg
    }

    /// Register a generator kind; duplicate kinds are fatal.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> ChoiceResult<()>
    where
        F: Fn(&Config, &str) -> ChoiceResult<Box<dyn ChoiceGenerator>> + 'static,
    {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(ChoiceError::DuplicateKind { kind });
        }
        debug!(kind, "registered choice generator kind");
        self.factories.insert(kind, Box::new(factory));
        Ok(())
    }

    fn must_register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&Config, &str) -> ChoiceResult<Box<dyn ChoiceGenerator>> + 'static,
    {
        self.register(kind, factory)
            .expect("default registration cannot collide");
    }

    /// Construct a generator of the given kind for the given id.
    pub fn create(
        &self,
        kind: &str,
        config: &Config,
        id: &str,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ChoiceError::UnknownKind {
                kind: kind.to_string(),
            })?;
        factory(config, id)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for CgRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
