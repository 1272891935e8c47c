//! Per-session memory for in-flight operation records.
//!
//! Each session owns one reusable slot. A record goes into the slot when the
//! slot is free and the record fits its capacity; anything else falls back to
//! an ordinary heap allocation. Only one operation is ever outstanding on a
//! session, so in steady state every record lands in the slot and completions
//! never touch the allocator.

use std::mem;

/// Capacity of the per-session slot, in bytes.
pub const HANDLER_SLOT_BYTES: usize = 1024;

/// Where an allocated record lives. Hand it back to the same
/// [`HandlerMemory`] to get the record out.
#[derive(Debug)]
pub enum HandlerBox<T> {
    Slot,
    Heap(Box<T>),
}

impl<T> HandlerBox<T> {
    pub fn is_slot(&self) -> bool {
        matches!(self, HandlerBox::Slot)
    }
}

#[derive(Debug)]
pub struct HandlerMemory<T> {
    slot: Option<T>,
    capacity: usize,
    enabled: bool,
    slot_hits: u64,
    heap_fallbacks: u64,
}

impl<T> HandlerMemory<T> {
    pub fn new() -> Self {
        Self::with_capacity(HANDLER_SLOT_BYTES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slot: None,
            capacity,
            enabled: true,
            slot_hits: 0,
            heap_fallbacks: 0,
        }
    }

    /// Never uses the slot; every record is boxed.
    pub fn heap_only() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn allocate(&mut self, value: T) -> HandlerBox<T> {
        if self.enabled && self.slot.is_none() && mem::size_of::<T>() <= self.capacity {
            self.slot = Some(value);
            self.slot_hits += 1;
            HandlerBox::Slot
        } else {
            self.heap_fallbacks += 1;
            HandlerBox::Heap(Box::new(value))
        }
    }

    /// Take the record back, freeing the slot if that is where it lived.
    /// Returns `None` only for a slot handle whose slot is already empty.
    pub fn release(&mut self, handle: HandlerBox<T>) -> Option<T> {
        match handle {
            HandlerBox::Slot => self.slot.take(),
            HandlerBox::Heap(boxed) => Some(*boxed),
        }
    }

    pub fn get<'a>(&'a self, handle: &'a HandlerBox<T>) -> Option<&'a T> {
        match handle {
            HandlerBox::Slot => self.slot.as_ref(),
            HandlerBox::Heap(boxed) => Some(boxed),
        }
    }

    pub fn in_use(&self) -> bool {
        self.slot.is_some()
    }

    pub fn slot_hits(&self) -> u64 {
        self.slot_hits
    }

    pub fn heap_fallbacks(&self) -> u64 {
        self.heap_fallbacks
    }
}

impl<T> Default for HandlerMemory<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Record {
        op: u8,
        len: u32,
    }

    #[test]
    fn free_slot_is_used() {
        let mut mem = HandlerMemory::new();
        let h = mem.allocate(Record { op: 1, len: 64 });
        assert!(h.is_slot());
        assert!(mem.in_use());
        assert_eq!(mem.get(&h), Some(&Record { op: 1, len: 64 }));

        assert_eq!(mem.release(h), Some(Record { op: 1, len: 64 }));
        assert!(!mem.in_use());
        assert_eq!((mem.slot_hits(), mem.heap_fallbacks()), (1, 0));
    }

    #[test]
    fn busy_slot_falls_back_to_heap() {
        let mut mem = HandlerMemory::new();
        let first = mem.allocate(Record { op: 1, len: 1 });
        let second = mem.allocate(Record { op: 2, len: 2 });
        assert!(first.is_slot());
        assert!(!second.is_slot());

        assert_eq!(mem.release(second), Some(Record { op: 2, len: 2 }));
        // The heap release leaves the slot owner untouched.
        assert!(mem.in_use());
        assert_eq!(mem.release(first), Some(Record { op: 1, len: 1 }));
        assert_eq!((mem.slot_hits(), mem.heap_fallbacks()), (1, 1));
    }

    #[test]
    fn oversized_record_falls_back_to_heap() {
        let mut mem = HandlerMemory::with_capacity(4);
        let h = mem.allocate(Record { op: 3, len: 3 });
        assert!(!h.is_slot());
        assert!(!mem.in_use());
        assert_eq!(mem.release(h), Some(Record { op: 3, len: 3 }));
    }

    #[test]
    fn slot_is_reused_after_release() {
        let mut mem = HandlerMemory::new();
        for i in 0..100u32 {
            let h = mem.allocate(Record { op: 0, len: i });
            assert!(h.is_slot());
            mem.release(h);
        }
        assert_eq!((mem.slot_hits(), mem.heap_fallbacks()), (100, 0));
    }

    #[test]
    fn heap_only_never_touches_slot() {
        let mut mem = HandlerMemory::heap_only();
        let h = mem.allocate(Record { op: 0, len: 0 });
        assert!(!h.is_slot());
        assert!(!mem.in_use());
        assert_eq!(mem.heap_fallbacks(), 1);
    }
}
