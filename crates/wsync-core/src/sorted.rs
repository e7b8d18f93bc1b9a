//! Id-ordered collections maintained by binary-search insertion.
//!
//! Every per-entity list in a directory store stays sorted ascending by id.
//! Nothing here ever re-sorts a whole list.

use crate::model::{Message, Part, PermissionRequest, Project, QuestionRequest, Session};

/// An entity addressed by a sortable string id.
pub trait Identified {
    fn id(&self) -> &str;
}

macro_rules! identified {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identified for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

identified!(Session, Message, Part, PermissionRequest, QuestionRequest, Project);

/// Result of an [`upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new entry was spliced in at the index.
    Inserted(usize),
    /// An existing entry with a different value was replaced in place.
    Replaced(usize),
    /// An equal entry was already present.
    Unchanged(usize),
}

impl Upsert {
    pub fn changed(self) -> bool {
        !matches!(self, Upsert::Unchanged(_))
    }

    pub fn inserted(self) -> bool {
        matches!(self, Upsert::Inserted(_))
    }
}

/// Binary search by id: `Ok(index)` when found, `Err(insertion_index)` otherwise.
pub fn search<T: Identified>(items: &[T], id: &str) -> Result<usize, usize> {
    items.binary_search_by(|probe| probe.id().cmp(id))
}

pub fn find<'a, T: Identified>(items: &'a [T], id: &str) -> Option<&'a T> {
    search(items, id).ok().map(|index| &items[index])
}

pub fn find_mut<'a, T: Identified>(items: &'a mut [T], id: &str) -> Option<&'a mut T> {
    match search(items, id) {
        Ok(index) => Some(&mut items[index]),
        Err(_) => None,
    }
}

/// Replaces the entry with the same id in place, or inserts at the sorted position.
pub fn upsert<T: Identified + PartialEq>(items: &mut Vec<T>, item: T) -> Upsert {
    match search(items, item.id()) {
        Ok(index) if items[index] == item => Upsert::Unchanged(index),
        Ok(index) => {
            items[index] = item;
            Upsert::Replaced(index)
        }
        Err(index) => {
            items.insert(index, item);
            Upsert::Inserted(index)
        }
    }
}

/// Removes the entry with `id`, if present.
pub fn remove<T: Identified>(items: &mut Vec<T>, id: &str) -> Option<T> {
    search(items, id).ok().map(|index| items.remove(index))
}
