//! Recency ordering over a fixed slot pool
//!
//! Slots are allocated once and addressed by index; the list links are
//! indices too, so relinking is O(1) and a slot can be rebound without any
//! allocation.

use crate::net::Network;

/// Handle of a slot in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

impl SlotId {
    /// Position of the slot in the pool
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Doubly-linked LRU order over every slot, most recent at the head
///
/// The list always holds every slot of the pool, bound or not. The tail is
/// the next eviction candidate.
#[derive(Debug)]
pub struct RecencyList {
    links: Vec<Links>,
    head: SlotId,
    tail: SlotId,
}

impl RecencyList {
    /// Chain `capacity` slots as `0 -> 1 -> ... -> capacity - 1`
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        let links = (0..capacity)
            .map(|i| Links {
                prev: i.checked_sub(1).map(SlotId),
                next: (i + 1 < capacity).then_some(SlotId(i + 1)),
            })
            .collect();

        Self {
            links,
            head: SlotId(0),
            tail: SlotId(capacity - 1),
        }
    }

    /// Move `id` to the head
    pub fn promote(&mut self, id: SlotId) {
        if self.head == id {
            return; // Already at front
        }

        let Links { prev, next } = self.links[id.index()];

        // Not the head, so a predecessor exists
        if let Some(prev_id) = prev {
            self.links[prev_id.index()].next = next;
        }
        match next {
            Some(next_id) => self.links[next_id.index()].prev = prev,
            None => {
                if let Some(prev_id) = prev {
                    self.tail = prev_id;
                }
            }
        }

        self.links[id.index()] = Links {
            prev: None,
            next: Some(self.head),
        };
        self.links[self.head.index()].prev = Some(id);
        self.head = id;
    }

    /// Eviction candidate; stays in place until it is promoted
    pub fn tail(&self) -> SlotId {
        self.tail
    }

    /// Most recently used slot
    pub fn head(&self) -> SlotId {
        self.head
    }

    /// Number of slots in the list
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Always false: the list holds at least one slot
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Slots from head to tail
    pub fn iter(&self) -> impl Iterator<Item = SlotId> + '_ {
        std::iter::successors(Some(self.head), move |id| self.links[id.index()].next)
    }
}

/// One reusable cache cell
#[derive(Debug)]
pub struct Slot<V> {
    value: Option<V>,
    network: Option<Network>,
    /// Bumped on every rebind
    generation: u64,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            value: None,
            network: None,
            generation: 0,
        }
    }

    /// Cached value, if bound
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Network the slot is bound to
    pub fn network(&self) -> Option<Network> {
        self.network
    }

    /// Rebind counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Does the slot hold a value?
    pub fn is_bound(&self) -> bool {
        self.network.is_some()
    }
}

/// Fixed pool of slots, never grown or shrunk after construction
#[derive(Debug)]
pub struct SlotPool<V> {
    slots: Vec<Slot<V>>,
    bound: usize,
}

impl<V> SlotPool<V> {
    /// Allocate `capacity` empty slots
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            bound: 0,
        }
    }

    /// Slot behind a handle
    pub fn get(&self, id: SlotId) -> &Slot<V> {
        &self.slots[id.index()]
    }

    /// Bind `id` to a new value and network, returning the network it held before
    pub fn bind(&mut self, id: SlotId, value: V, network: Network) -> Option<Network> {
        let slot = &mut self.slots[id.index()];
        let old = slot.network.replace(network);
        slot.value = Some(value);
        slot.generation += 1;
        if old.is_none() {
            self.bound += 1;
        }
        old
    }

    /// Number of bound slots
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Total slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a constructed pool
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every slot with its handle
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Slot<V>)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (SlotId(idx as u32), slot))
    }
}
