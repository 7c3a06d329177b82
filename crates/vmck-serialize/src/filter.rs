//! Filter policy: which fields and frames participate in state matching.
//!
//! The policy is an ordered chain of *ammendments*, each a pure function from
//! `(descriptor, running verdict)` to a new verdict, applied strictly in
//! registration order. Later ammendments may only overturn the running
//! verdict; they never see earlier ammendments' reasoning. Built-ins run
//! first, then configured ammendments, then the annotation-driven override
//! pass, which can force a field back in after an earlier exclusion.

use crate::error::TraversalError;
use ahash::AHashMap;
use std::fmt;
use tracing::debug;
use vmck_kernel::{ClassInfo, Config, ConfigError, FieldInfo, FilterMark, MethodInfo};

/// Per-frame filtering verdict, cached per method identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePolicy {
    /// Serialize local-variable slots.
    pub include_locals: bool,
    /// Serialize operand-stack slots.
    pub include_ops: bool,
    /// Serialize the current instruction offset.
    pub include_pc: bool,
    /// Keep walking into caller frames below this one.
    pub recurse: bool,
}

impl Default for FramePolicy {
    fn default() -> Self {
        Self {
            include_locals: true,
            include_ops: true,
            include_pc: true,
            recurse: true,
        }
    }
}

/// One link in the ammendment chain. A single ordered list of tagged
/// predicates replaces a hierarchy of single-method interfaces; the
/// dispatcher in [`FilterConfiguration`] applies each variant to the
/// category it belongs to.
pub enum Ammendment {
    /// Rewrites the frame policy for a method.
    Frame(Box<dyn Fn(&MethodInfo, FramePolicy) -> FramePolicy>),
    /// Amends the inclusion verdict for an instance field.
    Instance(Box<dyn Fn(&FieldInfo, bool) -> bool>),
    /// Amends the inclusion verdict for a static field.
    Static(Box<dyn Fn(&FieldInfo, bool) -> bool>),
    /// Amends both instance and static fields.
    Field(Box<dyn Fn(&FieldInfo, bool) -> bool>),
    /// Final override pass for instance fields, keyed on the class
    /// descriptor as well.
    InstanceOverride(Box<dyn Fn(&ClassInfo, &FieldInfo, bool) -> bool>),
}

impl fmt::Debug for Ammendment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Ammendment::Frame(_) => "Frame",
            Ammendment::Instance(_) => "Instance",
            Ammendment::Static(_) => "Static",
            Ammendment::Field(_) => "Field",
            Ammendment::InstanceOverride(_) => "InstanceOverride",
        };
        write!(f, "Ammendment::{tag}")
    }
}

/// Field names the built-in ammendments treat as reflection bookkeeping.
const REFLECTION_BOOKKEEPING: &[&str] = &["__class_handle", "__annotation_data", "__generic_info"];

/// Field names the built-in ammendments treat as synchronization internals;
/// lock state is serialized from the thread list instead.
const SYNC_INTERNALS: &[&str] = &["__monitor", "__wait_set", "__lock_count"];

/// Verdict contributed by an annotation-style [`FilterMark`], if the mark is
/// active under the given configuration.
fn mark_verdict(mark: &FilterMark, config: &Config) -> Option<bool> {
    let mut active = match &mark.gated_by {
        None => true,
        Some(key) => config.bool_or(key, false).unwrap_or(false),
    };
    if mark.invert {
        active = !active;
    }
    active.then_some(mark.include)
}

/// The ordered ammendment chain.
pub struct FilterConfiguration {
    ammendments: Vec<Ammendment>,
}

impl fmt::Debug for FilterConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterConfiguration")
            .field("ammendments", &self.ammendments)
            .finish()
    }
}

impl FilterConfiguration {
    /// Empty chain: everything is matched, default frame policy everywhere.
    pub fn empty() -> Self {
        Self {
            ammendments: Vec::new(),
        }
    }

    /// The built-in chain: ignore known-immutable constants, reflection
    /// bookkeeping and synchronization internals.
    pub fn standard() -> Self {
        let mut fc = Self::empty();
        fc.append(Ammendment::Field(Box::new(|fi, sofar| {
            // static final primitives cannot change; matching on them only
            // bloats the image
            if fi.is_static && fi.is_final && !fi.is_reference {
                false
            } else {
                sofar
            }
        })));
        fc.append(Ammendment::Field(Box::new(|fi, sofar| {
            if REFLECTION_BOOKKEEPING.contains(&fi.name.as_str()) {
                false
            } else {
                sofar
            }
        })));
        fc.append(Ammendment::Field(Box::new(|fi, sofar| {
            if SYNC_INTERNALS.contains(&fi.name.as_str()) {
                false
            } else {
                sofar
            }
        })));
        fc
    }

    /// Full chain: built-ins, then ammendments named by the `filter.*`
    /// config keys (resolved through `registry`), then the annotation
    /// override pass.
    pub fn from_config(config: &Config, registry: &AmmendmentRegistry) -> Result<Self, ConfigError> {
        let mut fc = Self::standard();

        for name in config.string_list("filter.frame_ammendments") {
            fc.append(registry.create_frame(&name)?);
        }
        for name in config.string_list("filter.instance_ammendments") {
            fc.append(registry.create_field(&name, Category::Instance)?);
        }
        for name in config.string_list("filter.static_ammendments") {
            fc.append(registry.create_field(&name, Category::Static)?);
        }
        for name in config.string_list("filter.instance_overrides") {
            fc.append(registry.create_override(&name)?);
        }

        // annotation-driven marks run last so they can overturn anything
        let cfg_instance = config.clone();
        fc.append(Ammendment::InstanceOverride(Box::new(move |_ci, fi, sofar| {
            fi.filter_mark
                .as_ref()
                .and_then(|m| mark_verdict(m, &cfg_instance))
                .unwrap_or(sofar)
        })));
        let cfg_static = config.clone();
        fc.append(Ammendment::Static(Box::new(move |fi, sofar| {
            fi.filter_mark
                .as_ref()
                .and_then(|m| mark_verdict(m, &cfg_static))
                .unwrap_or(sofar)
        })));

        debug!(ammendments = fc.ammendments.len(), "filter configuration built");
        Ok(fc)
    }

    /// Append a link; registration order is evaluation order.
    pub fn append(&mut self, a: Ammendment) {
        self.ammendments.push(a);
    }

    /// Frame policy for a method, after the whole chain has run.
    pub fn frame_policy(&self, mi: &MethodInfo) -> FramePolicy {
        let mut policy = FramePolicy::default();
        for a in &self.ammendments {
            if let Ammendment::Frame(f) = a {
                policy = f(mi, policy);
            }
        }
        policy
    }

    /// Instance fields of `ci` included in state matching, in declaration
    /// order. Consumed once per class to build the cached bitmasks.
    pub fn matched_instance_fields<'c>(&self, ci: &'c ClassInfo) -> Vec<&'c FieldInfo> {
        ci.instance_fields
            .iter()
            .filter(|fi| {
                let mut include = true;
                for a in &self.ammendments {
                    match a {
                        Ammendment::Instance(f) | Ammendment::Field(f) => {
                            include = f(fi, include);
                        }
                        Ammendment::InstanceOverride(f) => {
                            include = f(ci, fi, include);
                        }
                        _ => {}
                    }
                }
                include
            })
            .collect()
    }

    /// Static fields of `ci` included in state matching.
    pub fn matched_static_fields<'c>(&self, ci: &'c ClassInfo) -> Vec<&'c FieldInfo> {
        ci.static_fields
            .iter()
            .filter(|fi| {
                let mut include = true;
                for a in &self.ammendments {
                    match a {
                        Ammendment::Static(f) | Ammendment::Field(f) => {
                            include = f(fi, include);
                        }
                        _ => {}
                    }
                }
                include
            })
            .collect()
    }
}

/// Which field category a configured ammendment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Instance,
    Static,
}

/// Factory closure producing a fresh ammendment on each lookup.
type AmmendmentFactory = Box<dyn Fn() -> Ammendment>;

/// Field factories additionally take the category the config key named.
type FieldAmmendmentFactory = Box<dyn Fn(Category) -> Ammendment>;

fn field_ammendment(category: Category, f: Box<dyn Fn(&FieldInfo, bool) -> bool>) -> Ammendment {
    match category {
        Category::Instance => Ammendment::Instance(f),
        Category::Static => Ammendment::Static(f),
    }
}

/// String-keyed registry of configurable ammendments, populated at startup
/// with one factory closure per name, mirroring the choice generator
/// registry: `filter.*` config entries name entries here. Drivers register
/// their own factories the same way; re-registering a name replaces the
/// factory, so built-ins can be overridden.
pub struct AmmendmentRegistry {
    frames: AHashMap<String, AmmendmentFactory>,
    fields: AHashMap<String, FieldAmmendmentFactory>,
    overrides: AHashMap<String, AmmendmentFactory>,
}

impl AmmendmentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            frames: AHashMap::new(),
            fields: AHashMap::new(),
            overrides: AHashMap::new(),
        }
    }

    /// Registry with the stock ammendments registered.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register_frame("no_pc", || {
            Ammendment::Frame(Box::new(|_mi, mut p| {
                p.include_pc = false;
                p
            }))
        });
        reg.register_frame("no_locals", || {
            Ammendment::Frame(Box::new(|_mi, mut p| {
                p.include_locals = false;
                p
            }))
        });
        reg.register_frame("no_ops", || {
            Ammendment::Frame(Box::new(|_mi, mut p| {
                p.include_ops = false;
                p
            }))
        });
        reg.register_frame("top_frame_only", || {
            Ammendment::Frame(Box::new(|_mi, mut p| {
                p.recurse = false;
                p
            }))
        });
        reg.register_field("ignore_finals", |cat| {
            field_ammendment(cat, Box::new(|fi, sofar| if fi.is_final { false } else { sofar }))
        });
        reg.register_field("ignore_references", |cat| {
            field_ammendment(
                cat,
                Box::new(|fi, sofar| if fi.is_reference { false } else { sofar }),
            )
        });
        reg.register_override("include_all", || {
            Ammendment::InstanceOverride(Box::new(|_ci, _fi, _sofar| true))
        });
        reg
    }

    pub fn register_frame<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Ammendment + 'static,
    {
        let name = name.into();
        debug!(name, "registered frame ammendment");
        self.frames.insert(name, Box::new(factory));
    }

    pub fn register_field<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Category) -> Ammendment + 'static,
    {
        let name = name.into();
        debug!(name, "registered field ammendment");
        self.fields.insert(name, Box::new(factory));
    }

    pub fn register_override<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Ammendment + 'static,
    {
        let name = name.into();
        debug!(name, "registered override ammendment");
        self.overrides.insert(name, Box::new(factory));
    }

    pub fn create_frame(&self, name: &str) -> Result<Ammendment, ConfigError> {
        self.frames
            .get(name)
            .map(|f| f())
            .ok_or_else(|| ConfigError::UnknownImplementation {
                key: "filter.frame_ammendments".into(),
                value: name.into(),
            })
    }

    pub fn create_field(&self, name: &str, category: Category) -> Result<Ammendment, ConfigError> {
        self.fields.get(name).map(|f| f(category)).ok_or_else(|| {
            ConfigError::UnknownImplementation {
                key: match category {
                    Category::Instance => "filter.instance_ammendments".into(),
                    Category::Static => "filter.static_ammendments".into(),
                },
                value: name.into(),
            }
        })
    }

    pub fn create_override(&self, name: &str) -> Result<Ammendment, ConfigError> {
        self.overrides
            .get(name)
            .map(|f| f())
            .ok_or_else(|| ConfigError::UnknownImplementation {
                key: "filter.instance_overrides".into(),
                value: name.into(),
            })
    }
}

impl Default for AmmendmentRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Validate that every field has a storage layout the serializer can handle.
/// Called once per class while the masks are built.
pub(crate) fn check_field_kind(ci: &ClassInfo, fi: &FieldInfo) -> Result<(), TraversalError> {
    if fi.storage_size == 1 || fi.storage_size == 2 {
        Ok(())
    } else {
        Err(TraversalError::UnrecognizedFieldKind {
            class: ci.name.clone(),
            field: fi.name.clone(),
            size: fi.storage_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmck_kernel::ClassId;

    fn class_with(fields: Vec<FieldInfo>) -> ClassInfo {
        ClassInfo::new(ClassId(0), "T").with_instance_fields(fields)
    }

    #[test]
    fn builtins_drop_constants_and_internals() {
        let fc = FilterConfiguration::standard();
        let ci = ClassInfo::new(ClassId(0), "T")
            .with_instance_fields(vec![
                FieldInfo::new("x", 0),
                FieldInfo::new("__monitor", 1),
            ])
            .with_static_fields(vec![
                FieldInfo::new("LIMIT", 0).static_field().final_field(),
                FieldInfo::new("counter", 1).static_field(),
            ]);

        let inst: Vec<_> = fc.matched_instance_fields(&ci).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(inst, vec!["x"]);

        let stat: Vec<_> = fc.matched_static_fields(&ci).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(stat, vec!["counter"]);
    }

    #[test]
    fn later_ammendments_overturn_earlier_ones() {
        let mut fc = FilterConfiguration::empty();
        fc.append(Ammendment::Instance(Box::new(|fi, s| {
            if fi.name == "x" {
                false
            } else {
                s
            }
        })));
        fc.append(Ammendment::Instance(Box::new(|fi, s| {
            if fi.name == "x" {
                true
            } else {
                s
            }
        })));

        let ci = class_with(vec![FieldInfo::new("x", 0)]);
        assert_eq!(fc.matched_instance_fields(&ci).len(), 1);
    }

    #[test]
    fn mark_overrides_builtin_exclusion() {
        let cfg = Config::new();
        let fc = FilterConfiguration::from_config(&cfg, &AmmendmentRegistry::with_defaults()).unwrap();

        // a sync-internal field would be excluded by the built-ins, but a
        // force-include mark wins because it runs last
        let ci = class_with(vec![FieldInfo::new("__monitor", 0).marked(FilterMark {
            include: true,
            gated_by: None,
            invert: false,
        })]);
        assert_eq!(fc.matched_instance_fields(&ci).len(), 1);
    }

    #[test]
    fn gated_mark_respects_config_key_and_invert() {
        let registry = AmmendmentRegistry::with_defaults();
        let ci = class_with(vec![FieldInfo::new("x", 0).marked(FilterMark {
            include: false,
            gated_by: Some("match.x".into()),
            invert: false,
        })]);

        let cfg = Config::new(); // gate unset -> mark inactive
        let fc = FilterConfiguration::from_config(&cfg, &registry).unwrap();
        assert_eq!(fc.matched_instance_fields(&ci).len(), 1);

        let cfg: Config = [("match.x", "true")].into_iter().collect();
        let fc = FilterConfiguration::from_config(&cfg, &registry).unwrap();
        assert_eq!(fc.matched_instance_fields(&ci).len(), 0);

        // inverted gate: active while the key is unset
        let ci = class_with(vec![FieldInfo::new("x", 0).marked(FilterMark {
            include: false,
            gated_by: Some("match.x".into()),
            invert: true,
        })]);
        let fc = FilterConfiguration::from_config(&Config::new(), &registry).unwrap();
        assert_eq!(fc.matched_instance_fields(&ci).len(), 0);
    }

    #[test]
    fn configured_ammendments_by_name() {
        let cfg: Config = [("filter.instance_ammendments", "ignore_finals")]
            .into_iter()
            .collect();
        let fc = FilterConfiguration::from_config(&cfg, &AmmendmentRegistry::with_defaults()).unwrap();

        let ci = class_with(vec![
            FieldInfo::new("a", 0).final_field(),
            FieldInfo::new("b", 1),
        ]);
        let names: Vec<_> = fc.matched_instance_fields(&ci).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn unknown_ammendment_is_fatal() {
        let cfg: Config = [("filter.static_ammendments", "bogus")].into_iter().collect();
        let err = FilterConfiguration::from_config(&cfg, &AmmendmentRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownImplementation { .. }));
    }

    #[test]
    fn driver_registered_ammendments_resolve_by_name() {
        let mut registry = AmmendmentRegistry::with_defaults();
        registry.register_field("ignore_cache", |cat| {
            field_ammendment(
                cat,
                Box::new(|fi, sofar| if fi.name.starts_with("cache") { false } else { sofar }),
            )
        });

        let cfg: Config = [("filter.instance_ammendments", "ignore_cache")]
            .into_iter()
            .collect();
        let fc = FilterConfiguration::from_config(&cfg, &registry).unwrap();

        let ci = class_with(vec![
            FieldInfo::new("cache_line", 0),
            FieldInfo::new("value", 1),
        ]);
        let names: Vec<_> = fc.matched_instance_fields(&ci).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["value"]);

        // an empty registry knows no names at all, built-ins included
        assert!(AmmendmentRegistry::new().create_field("ignore_finals", Category::Instance).is_err());
    }

    #[test]
    fn re_registration_replaces_the_factory() {
        let mut registry = AmmendmentRegistry::with_defaults();
        registry.register_override("include_all", || {
            Ammendment::InstanceOverride(Box::new(|_ci, fi, sofar| fi.name == "x" || sofar))
        });

        let mut fc = FilterConfiguration::empty();
        fc.append(Ammendment::Instance(Box::new(|_fi, _s| false)));
        fc.append(registry.create_override("include_all").unwrap());

        let ci = class_with(vec![FieldInfo::new("x", 0), FieldInfo::new("y", 1)]);
        let names: Vec<_> = fc.matched_instance_fields(&ci).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn frame_policy_chain() {
        let registry = AmmendmentRegistry::with_defaults();
        let mut fc = FilterConfiguration::standard();
        fc.append(registry.create_frame("no_pc").unwrap());
        fc.append(registry.create_frame("top_frame_only").unwrap());

        let mi = MethodInfo::new(vmck_kernel::MethodId(0), "T.run", 2);
        let p = fc.frame_policy(&mi);
        assert!(!p.include_pc);
        assert!(!p.recurse);
        assert!(p.include_locals && p.include_ops);
    }
}
