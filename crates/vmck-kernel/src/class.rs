//! Class, field and method metadata.
//!
//! Classes are immutable once registered; the serializer relies on this to
//! cache per-class filter bitmasks for the process lifetime. Field storage is
//! word-addressed: a field occupies `storage_size` consecutive 32-bit slots
//! starting at `offset` in the owning class's instance (or static) data.

use std::fmt;

/// Stable integer class id, valid for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Stable integer method id, valid for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

/// Annotation-style state-matching override attached to a field.
///
/// `include = true` forces the field into the state image even if an earlier
/// filter ammendment excluded it; `include = false` forces it out. When
/// `gated_by` names a config key, the mark only applies if that key is set to
/// true (or false, with `invert`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMark {
    pub include: bool,
    pub gated_by: Option<String>,
    pub invert: bool,
}

/// Declared field descriptor.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    /// First storage word within the owning storage area.
    pub offset: usize,
    /// Number of 32-bit words (1, or 2 for wide values).
    pub storage_size: usize,
    pub is_reference: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub filter_mark: Option<FilterMark>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, offset: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            storage_size: 1,
            is_reference: false,
            is_static: false,
            is_final: false,
            filter_mark: None,
        }
    }

    pub fn reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    pub fn wide(mut self) -> Self {
        self.storage_size = 2;
        self
    }

    pub fn final_field(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn marked(mut self, mark: FilterMark) -> Self {
        self.filter_mark = Some(mark);
        self
    }
}

/// Class descriptor: declared fields plus derived storage sizes.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub instance_fields: Vec<FieldInfo>,
    pub static_fields: Vec<FieldInfo>,
}

impl ClassInfo {
    pub fn new(id: ClassId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            instance_fields: Vec::new(),
            static_fields: Vec::new(),
        }
    }

    pub fn with_instance_fields(mut self, fields: Vec<FieldInfo>) -> Self {
        self.instance_fields = fields;
        self
    }

    pub fn with_static_fields(mut self, fields: Vec<FieldInfo>) -> Self {
        self.static_fields = fields;
        self
    }

    /// Instance storage size in words.
    pub fn instance_data_size(&self) -> usize {
        Self::data_size(&self.instance_fields)
    }

    /// Static storage size in words.
    pub fn static_data_size(&self) -> usize {
        Self::data_size(&self.static_fields)
    }

    fn data_size(fields: &[FieldInfo]) -> usize {
        fields
            .iter()
            .map(|f| f.offset + f.storage_size)
            .max()
            .unwrap_or(0)
    }
}

/// Method descriptor. `max_locals` marks the boundary between local-variable
/// slots and operand-stack slots within a frame.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub id: MethodId,
    pub full_name: String,
    pub max_locals: usize,
}

impl MethodInfo {
    pub fn new(id: MethodId, full_name: impl Into<String>, max_locals: usize) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            max_locals,
        }
    }
}

/// Registry of all loaded classes, indexed by [`ClassId`].
#[derive(Debug, Clone, Default)]
pub struct Classes {
    by_id: Vec<ClassInfo>,
}

impl Classes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class; its id must equal its registration order.
    pub fn register(&mut self, class: ClassInfo) -> ClassId {
        assert_eq!(class.id.0 as usize, self.by_id.len(), "class id gap");
        let id = class.id;
        self.by_id.push(class);
        id
    }

    pub fn get(&self, id: ClassId) -> &ClassInfo {
        &self.by_id[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.by_id.iter()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Registry of all methods, indexed by [`MethodId`].
#[derive(Debug, Clone, Default)]
pub struct Methods {
    by_id: Vec<MethodInfo>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: MethodInfo) -> MethodId {
        assert_eq!(method.id.0 as usize, self.by_id.len(), "method id gap");
        let id = method.id;
        self.by_id.push(method);
        id
    }

    pub fn get(&self, id: MethodId) -> &MethodInfo {
        &self.by_id[id.0 as usize]
    }
}
