//! Registry of open streams.
//!
//! A slot arena behind one `parking_lot::Mutex`: each stream occupies a slot
//! stamped with a generation counter, freed slots go on a free list and are
//! reused with a bumped generation, so a stale [`StreamHandle`] never
//! matches a newer stream. Slots hold weak references; ownership stays with
//! the [`Stream`](crate::Stream) handle.
//!
//! Lock order is registry first, then stream.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::stream::StreamCore;

/// Identifies a registered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    index: u32,
    generation: u32,
}

impl StreamHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct Slot {
    generation: u32,
    stream: Option<Weak<Mutex<StreamCore>>>,
}

struct Arena {
    slots: Vec<Slot>,
    /// Free slot indices for reuse.
    free_list: Vec<usize>,
    live: usize,
}

/// Set of all open streams.
pub struct StreamRegistry {
    arena: Mutex<Arena>,
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("live", &self.len())
            .finish()
    }
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            arena: Mutex::new(Arena {
                slots: Vec::new(),
                free_list: Vec::new(),
                live: 0,
            }),
        })
    }

    /// Process-wide registry.
    pub fn global() -> &'static Arc<StreamRegistry> {
        static GLOBAL: OnceLock<Arc<StreamRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(StreamRegistry::new)
    }

    /// Take the registry lock.
    pub fn lock(self: &Arc<Self>) -> RegistryGuard<'_> {
        RegistryGuard {
            registry: self,
            arena: self.arena.lock(),
        }
    }

    pub fn len(&self) -> usize {
        self.arena.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(self: &Arc<Self>, handle: StreamHandle) -> bool {
        self.lock().contains(handle)
    }

    pub(crate) fn remove(self: &Arc<Self>, handle: StreamHandle) -> bool {
        self.lock().remove(handle)
    }

    /// Run `f` on every registered stream, each under its own lock, and
    /// return the bitwise OR of the results.
    pub fn iterate<F>(self: &Arc<Self>, f: F) -> u32
    where
        F: FnMut(&mut StreamCore) -> u32,
    {
        self.lock().iterate(f)
    }

    /// Flush every stream in write mode. All streams are attempted; the
    /// call fails if any of them did.
    pub fn flush_all(self: &Arc<Self>) -> Result<()> {
        let failed = self.iterate(|core| {
            if core.is_writing() && core.flush().is_err() {
                1
            } else {
                0
            }
        });
        if failed != 0 {
            return Err(StreamError::Io(std::io::Error::other(
                "one or more streams failed to flush",
            )));
        }
        Ok(())
    }
}

/// Held registry lock.
pub struct RegistryGuard<'a> {
    registry: &'a Arc<StreamRegistry>,
    arena: MutexGuard<'a, Arena>,
}

impl RegistryGuard<'_> {
    pub(crate) fn registry(&self) -> &Arc<StreamRegistry> {
        self.registry
    }

    pub(crate) fn add(&mut self, core: &Arc<Mutex<StreamCore>>) -> StreamHandle {
        let stream = Some(Arc::downgrade(core));
        let arena = &mut *self.arena;
        let index = match arena.free_list.pop() {
            Some(index) => {
                arena.slots[index].stream = stream;
                index
            }
            None => {
                arena.slots.push(Slot {
                    generation: 1,
                    stream,
                });
                arena.slots.len() - 1
            }
        };
        arena.live += 1;
        let handle = StreamHandle {
            index: index as u32,
            generation: arena.slots[index].generation,
        };
        debug!(index, generation = handle.generation, live = arena.live, "stream registered");
        handle
    }

    /// Deregister; false if the handle is stale.
    pub(crate) fn remove(&mut self, handle: StreamHandle) -> bool {
        let arena = &mut *self.arena;
        let index = handle.index as usize;
        let Some(slot) = arena.slots.get_mut(index) else {
            return false;
        };
        if slot.generation != handle.generation || slot.stream.is_none() {
            return false;
        }
        slot.stream = None;
        slot.generation = slot.generation.wrapping_add(1);
        arena.free_list.push(index);
        arena.live -= 1;
        debug!(index, live = arena.live, "stream deregistered");
        true
    }

    pub fn contains(&self, handle: StreamHandle) -> bool {
        self.arena
            .slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.stream.is_some())
    }

    pub fn len(&self) -> usize {
        self.arena.live
    }

    pub fn is_empty(&self) -> bool {
        self.arena.live == 0
    }

    /// [`StreamRegistry::iterate`] with the lock already held.
    pub fn iterate<F>(&mut self, mut f: F) -> u32
    where
        F: FnMut(&mut StreamCore) -> u32,
    {
        let mut acc = 0;
        for slot in &self.arena.slots {
            let Some(core) = slot.stream.as_ref().and_then(Weak::upgrade) else {
                continue;
            };
            let mut core = core.lock();
            if core.is_closed() {
                continue;
            }
            acc |= f(&mut core);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stream;

    #[test]
    fn add_and_remove_track_live_count() {
        let registry = StreamRegistry::new();
        let a = Stream::open_memory(&registry, None, "w+").unwrap();
        let b = Stream::open_memory(&registry, None, "w+").unwrap();
        assert_eq!(registry.len(), 2);
        let ha = a.handle().unwrap();
        assert!(registry.contains(ha));
        a.close().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(ha));
        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let registry = StreamRegistry::new();
        let a = Stream::open_memory(&registry, None, "w+").unwrap();
        let stale = a.handle().unwrap();
        a.close().unwrap();
        let b = Stream::open_memory(&registry, None, "w+").unwrap();
        let fresh = b.handle().unwrap();
        assert_eq!(fresh.index(), stale.index());
        assert_ne!(fresh.generation(), stale.generation());
        assert!(!registry.contains(stale));
        assert!(!registry.lock().remove(stale));
        assert!(registry.contains(fresh));
    }

    #[test]
    fn iterate_ors_results() {
        let registry = StreamRegistry::new();
        let _a = Stream::open_memory(&registry, None, "r").unwrap();
        let _b = Stream::open_memory(&registry, None, "w+").unwrap();
        let mask = registry.iterate(|core| if core.is_writing() { 2 } else { 1 });
        assert_eq!(mask, 3);
        let mut count = 0;
        registry.iterate(|_| {
            count += 1;
            0
        });
        assert_eq!(count, 2);
    }

    #[test]
    fn open_while_holding_lock() {
        let registry = StreamRegistry::new();
        let mut guard = registry.lock();
        let s = Stream::builder()
            .open_in(
                &mut guard,
                crate::backend::MemoryBackend::new(Default::default()),
                "w",
            )
            .unwrap();
        assert_eq!(guard.len(), 1);
        s.close_in(&mut guard).unwrap();
        assert!(guard.is_empty());
    }
}
