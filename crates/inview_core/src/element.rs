//! Element identity
//!
//! Engines refer to host nodes only through [`ElementId`]. Each host keeps its
//! own arena from id to node and releases the node when the element goes away,
//! so an unwatched element is never kept alive by the engines.

use slotmap::new_key_type;

new_key_type! {
    /// Stable handle to a host element
    pub struct ElementId;
}

impl ElementId {
    /// Convert to raw u64 for storage outside the arena
    pub fn to_raw(self) -> u64 {
        self.0.as_ffi()
    }

    /// Reconstruct from raw u64
    ///
    /// The raw value must come from `to_raw()`; a stale or foreign value
    /// resolves to no element in the host arena.
    pub fn from_raw(raw: u64) -> Self {
        ElementId::from(slotmap::KeyData::from_ffi(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_raw_roundtrip_resolves_same_slot() {
        let mut arena: SlotMap<ElementId, &str> = SlotMap::with_key();
        let id = arena.insert("hero");

        let restored = ElementId::from_raw(id.to_raw());
        assert_eq!(restored, id);
        assert_eq!(arena.get(restored), Some(&"hero"));
    }

    #[test]
    fn test_stale_id_does_not_resolve() {
        let mut arena: SlotMap<ElementId, &str> = SlotMap::with_key();
        let id = arena.insert("first");
        arena.remove(id);
        let reused = arena.insert("second");

        assert_ne!(id, reused);
        assert!(arena.get(id).is_none());
    }
}
