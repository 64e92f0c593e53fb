//! Generational Arena Implementation
//!
//! Heap objects live in generational arenas and are addressed by handles.
//! A handle stays checkable after its slot is freed: the generation stored
//! in the slot no longer matches, so lookups fail instead of aliasing the
//! slot's next occupant.

use std::marker::PhantomData;

/// Entry in the arena that can be either occupied or free
#[derive(Debug)]
enum Entry<T> {
    /// An occupied slot containing a value and its generation
    Occupied { value: T, generation: u32 },

    /// A free slot with a link to the next free slot
    Free { next_free: Option<usize> },
}

/// A generational arena for storing values of type T
pub struct Arena<T> {
    /// Storage for all entries
    entries: Vec<Entry<T>>,

    /// Head of the free list
    free_head: Option<usize>,

    /// Current generation counter
    generation: u32,

    /// Number of occupied slots
    len: usize,
}

/// A handle to a value in the arena
pub struct Handle<T> {
    /// Index in the arena
    pub(crate) index: u32,

    /// Generation number for validation
    pub(crate) generation: u32,

    /// Type marker
    _phantom: PhantomData<T>,
}

impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<T> Arena<T> {
    /// Create a new arena with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            entries: Vec::with_capacity(capacity),
            free_head: None,
            generation: 0,
            len: 0,
        }
    }

    /// Insert a value into the arena and return a handle to it
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.generation = self.generation.wrapping_add(1);
        self.len += 1;

        let index = match self.free_head {
            Some(free_index) => {
                if let Entry::Free { next_free } = self.entries[free_index] {
                    self.free_head = next_free;
                }
                self.entries[free_index] = Entry::Occupied {
                    value,
                    generation: self.generation,
                };
                free_index
            }
            None => {
                self.entries.push(Entry::Occupied {
                    value,
                    generation: self.generation,
                });
                self.entries.len() - 1
            }
        };

        Handle {
            index: index as u32,
            generation: self.generation,
            _phantom: PhantomData,
        }
    }

    /// Get a reference to a value by handle
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.entries.get(handle.index as usize)? {
            Entry::Occupied { value, generation } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Get a mutable reference to a value by handle
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.entries.get_mut(handle.index as usize)? {
            Entry::Occupied { value, generation } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Check if a handle is valid
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Get the number of occupied entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Free every occupied slot whose handle `keep` rejects.
    ///
    /// Returns the number of freed slots.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(Handle<T>, &T) -> bool,
    {
        let mut freed = 0;

        for index in 0..self.entries.len() {
            let drop_slot = match &self.entries[index] {
                Entry::Occupied { value, generation } => {
                    let handle = Handle {
                        index: index as u32,
                        generation: *generation,
                        _phantom: PhantomData,
                    };
                    !keep(handle, value)
                }
                Entry::Free { .. } => false,
            };

            if drop_slot {
                self.entries[index] = Entry::Free { next_free: self.free_head };
                self.free_head = Some(index);
                freed += 1;
            }
        }

        self.len -= freed;
        freed
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_insert_and_get() {
        let mut arena = Arena::default();

        let handle = arena.insert(42);
        assert_eq!(arena.get(handle), Some(&42));

        if let Some(value) = arena.get_mut(handle) {
            *value = 84;
        }

        assert_eq!(arena.get(handle), Some(&84));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_retain_frees_rejected_slots() {
        let mut arena = Arena::default();

        let h1 = arena.insert(1);
        let h2 = arena.insert(2);
        let h3 = arena.insert(3);

        let freed = arena.retain(|_, value| value % 2 == 1);
        assert_eq!(freed, 1);
        assert_eq!(arena.len(), 2);

        assert!(arena.contains(h1));
        assert!(!arena.contains(h2));
        assert!(arena.contains(h3));
    }

    #[test]
    fn test_freed_slot_reuse_bumps_generation() {
        let mut arena = Arena::default();

        let h1 = arena.insert("a");
        arena.retain(|_, _| false);
        let h2 = arena.insert("b");

        // Same slot, new generation: the old handle must not see the new value
        assert_eq!(h1.index, h2.index);
        assert_ne!(h1.generation, h2.generation);
        assert_eq!(arena.get(h1), None);
        assert_eq!(arena.get(h2), Some(&"b"));
    }
}
