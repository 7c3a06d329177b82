//! Static storage, per class loader.

use crate::class::ClassId;

/// Class-initialization status values for a statics entry. Anything negative
/// means the class has not reached a serializable initialization state yet.
pub const STATUS_INITIALIZED: i32 = 0;
pub const STATUS_UNINITIALIZED: i32 = -1;

/// Static storage of one live class.
#[derive(Debug, Clone)]
pub struct StaticsEntry {
    pub class: ClassId,
    /// Liveness/initialization status word; serialized ahead of the fields.
    pub status: i32,
    /// Static field slot words, laid out per the class's static offsets.
    pub slots: Vec<i32>,
}

impl StaticsEntry {
    pub fn new(class: ClassId, slots: Vec<i32>) -> Self {
        Self {
            class,
            status: STATUS_INITIALIZED,
            slots,
        }
    }
}

/// Static storage area of one class loader.
#[derive(Debug, Clone, Default)]
pub struct Statics {
    entries: Vec<StaticsEntry>,
}

impl Statics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: StaticsEntry) {
        self.entries.push(entry);
    }

    pub fn live(&self) -> impl Iterator<Item = &StaticsEntry> {
        self.entries.iter()
    }

    pub fn entry_mut(&mut self, class: ClassId) -> Option<&mut StaticsEntry> {
        self.entries.iter_mut().find(|e| e.class == class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One class loader and its static storage.
#[derive(Debug, Clone)]
pub struct ClassLoaderInfo {
    pub id: u32,
    pub alive: bool,
    pub statics: Statics,
}

impl ClassLoaderInfo {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            alive: true,
            statics: Statics::new(),
        }
    }
}
