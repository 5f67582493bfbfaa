//! Slot arena and the index-linked circular lists threaded through it.
//!
//! Every list the wheel owns — the 64 bins, the expired queue, the staging
//! queue — is a circular doubly-linked list whose links are `u32` slot
//! indices into one arena. List heads are permanent sentinel slots at the
//! front of the arena; an empty list is a sentinel linked to itself. Record
//! slots follow the sentinels and are recycled through an intrusive free
//! list. Each slot carries a generation counter bumped on release, so a
//! handle to a recycled slot is detected in O(1).
//!
//! All list operations are O(1), including [`Arena::splice_append`], which
//! moves an entire list onto the tail of another by relinking four slots.
//! Nodes carry no back-reference to the list containing them; provenance is
//! the caller's business.

use crate::timeout::Timeout;

/// Number of bins, one per bit of the expiry word.
pub const BIN_COUNT: usize = 64;

/// Sentinel index of the expired queue.
pub(crate) const EXPIRED: u32 = BIN_COUNT as u32;

/// Sentinel index of the staging queue used while time advances.
pub(crate) const PROCESSING: u32 = EXPIRED + 1;

/// First arena index that can hold a record.
const FIRST_RECORD: u32 = PROCESSING + 1;

/// Free-list terminator.
const NIL: u32 = u32::MAX;

/// Sentinel index of bin `index`.
#[inline]
pub(crate) fn bin(index: u32) -> u32 {
    debug_assert!((index as usize) < BIN_COUNT);
    index
}

struct Slot<T> {
    next: u32,
    prev: u32,
    generation: u32,
    expired: bool,
    entry: Option<Timeout<T>>,
}

/// Arena of record slots with the wheel's sentinel list heads embedded at
/// the front.
///
/// Each record slot carries an `expired` flag mirroring membership in the
/// expired queue; the flag and the `expired_len` counter are kept exact at
/// every boundary a record crosses into or out of that queue, so the pending
/// population is O(1) to read without conflating it with the `live`
/// invariant counter.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    live: usize,
    expired_len: usize,
}

impl<T> Arena<T> {
    /// Creates an arena with all lists empty and room for `records` records
    /// before the first growth.
    pub(crate) fn with_capacity(records: usize) -> Self {
        let mut slots = Vec::with_capacity(FIRST_RECORD as usize + records);
        for index in 0..FIRST_RECORD {
            slots.push(Slot {
                next: index,
                prev: index,
                generation: 0,
                expired: false,
                entry: None,
            });
        }
        Self {
            slots,
            free_head: NIL,
            live: 0,
            expired_len: 0,
        }
    }

    /// Number of records in the expired queue.
    pub(crate) fn expired_len(&self) -> usize {
        self.expired_len
    }

    /// Number of records not yet expired: scheduled in a bin or staged.
    pub(crate) fn pending_len(&self) -> usize {
        self.live - self.expired_len
    }

    /// Claims a slot for `entry`; returns the slot index and its generation.
    ///
    /// The slot's links are garbage until the caller pushes it onto a list.
    pub(crate) fn insert(&mut self, entry: Timeout<T>) -> (u32, u32) {
        self.live += 1;
        if self.free_head == NIL {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                next: NIL,
                prev: NIL,
                generation: 0,
                expired: false,
                entry: Some(entry),
            });
            (index, 0)
        } else {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            self.free_head = slot.next;
            debug_assert!(!slot.expired, "free slot carries an expired flag");
            slot.entry = Some(entry);
            (index, slot.generation)
        }
    }

    /// Takes the record out of an unlinked slot and recycles the slot.
    pub(crate) fn remove(&mut self, index: u32) -> Timeout<T> {
        debug_assert!(index >= FIRST_RECORD);
        let free_head = self.free_head;
        let slot = &mut self.slots[index as usize];
        let entry = slot.entry.take().expect("removed slot holds a record");
        if slot.expired {
            slot.expired = false;
            self.expired_len -= 1;
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.next = free_head;
        self.free_head = index;
        self.live -= 1;
        entry
    }

    /// Flags `node` as a member of the expired queue. Idempotent; the
    /// caller links the node into the queue itself.
    pub(crate) fn mark_expired(&mut self, node: u32) {
        let slot = &mut self.slots[node as usize];
        if !slot.expired {
            slot.expired = true;
            self.expired_len += 1;
        }
    }

    /// Clears the expired flag on a node leaving the queue. Idempotent.
    pub(crate) fn clear_expired(&mut self, node: u32) {
        let slot = &mut self.slots[node as usize];
        if slot.expired {
            slot.expired = false;
            self.expired_len -= 1;
        }
    }

    /// Moves every node of `src` onto the tail of the expired queue,
    /// flagging each one. O(length of `src`); the caller drains these
    /// records next, so the walk rides work it is already committed to.
    pub(crate) fn expire_list(&mut self, src: u32) {
        let mut node = self.slots[src as usize].next;
        while node != src {
            self.mark_expired(node);
            node = self.slots[node as usize].next;
        }
        self.splice_append(EXPIRED, src);
    }

    /// True if `index`/`generation` still names a record in this arena.
    pub(crate) fn contains(&self, index: u32, generation: u32) -> bool {
        index >= FIRST_RECORD
            && (index as usize) < self.slots.len()
            && self.slots[index as usize].generation == generation
            && self.slots[index as usize].entry.is_some()
    }

    /// Expiry timestamp of the record in `index`.
    pub(crate) fn when(&self, index: u32) -> u64 {
        self.slots[index as usize]
            .entry
            .as_ref()
            .expect("slot holds a record")
            .when()
    }

    /// Overwrites the expiry timestamp of the record in `index`.
    pub(crate) fn set_when(&mut self, index: u32, when: u64) {
        self.slots[index as usize]
            .entry
            .as_mut()
            .expect("slot holds a record")
            .set_when(when);
    }

    // ------------------------------------------------------------------
    // List operations
    // ------------------------------------------------------------------

    /// True if the list headed by sentinel `list` has no nodes.
    pub(crate) fn list_is_empty(&self, list: u32) -> bool {
        self.slots[list as usize].next == list
    }

    /// Links `node` at the tail of `list`.
    pub(crate) fn push_back(&mut self, list: u32, node: u32) {
        let tail = self.slots[list as usize].prev;
        self.slots[node as usize].prev = tail;
        self.slots[node as usize].next = list;
        self.slots[tail as usize].next = node;
        self.slots[list as usize].prev = node;
    }

    /// Unlinks and returns the head node of `list`, if any.
    pub(crate) fn pop_front(&mut self, list: u32) -> Option<u32> {
        let node = self.slots[list as usize].next;
        if node == list {
            return None;
        }
        self.unlink(node);
        Some(node)
    }

    /// Detaches a linked node from whichever list holds it.
    pub(crate) fn unlink(&mut self, node: u32) {
        let prev = self.slots[node as usize].prev;
        let next = self.slots[node as usize].next;
        self.slots[prev as usize].next = next;
        self.slots[next as usize].prev = prev;
    }

    /// Moves every node of `src` onto the tail of `dst`, leaving `src` empty.
    pub(crate) fn splice_append(&mut self, dst: u32, src: u32) {
        if self.list_is_empty(src) {
            return;
        }
        let first = self.slots[src as usize].next;
        let last = self.slots[src as usize].prev;
        let tail = self.slots[dst as usize].prev;
        self.slots[tail as usize].next = first;
        self.slots[first as usize].prev = tail;
        self.slots[last as usize].next = dst;
        self.slots[dst as usize].prev = last;
        self.slots[src as usize].next = src;
        self.slots[src as usize].prev = src;
    }

    /// Walks `list` and counts its nodes. O(length); diagnostics only.
    pub(crate) fn list_len(&self, list: u32) -> usize {
        let mut count = 0;
        let mut node = self.slots[list as usize].next;
        while node != list {
            count += 1;
            node = self.slots[node as usize].next;
        }
        count
    }

    /// Iterates the node indices of `list` front to back.
    pub(crate) fn iter_list(&self, list: u32) -> ListIter<'_, T> {
        ListIter {
            arena: self,
            list,
            node: self.slots[list as usize].next,
        }
    }

    /// Walks every list and asserts structural sanity: links are symmetric,
    /// listed slots hold records, and every live record is reachable from
    /// exactly one sentinel. Test support; O(slots).
    pub(crate) fn assert_consistent(&self) {
        let mut reachable = 0;
        let mut expired_reachable = 0;
        for sentinel in 0..FIRST_RECORD {
            let mut prev = sentinel;
            let mut node = self.slots[sentinel as usize].next;
            while node != sentinel {
                assert!(
                    node >= FIRST_RECORD,
                    "sentinel {node} linked inside list {sentinel}"
                );
                assert_eq!(
                    self.slots[node as usize].prev, prev,
                    "asymmetric links at slot {node}"
                );
                assert!(
                    self.slots[node as usize].entry.is_some(),
                    "listed slot {node} holds no record"
                );
                assert_eq!(
                    self.slots[node as usize].expired,
                    sentinel == EXPIRED,
                    "expired flag out of sync on slot {node} in list {sentinel}"
                );
                if sentinel == EXPIRED {
                    expired_reachable += 1;
                }
                reachable += 1;
                prev = node;
                node = self.slots[node as usize].next;
            }
            assert_eq!(
                self.slots[sentinel as usize].prev, prev,
                "asymmetric tail link on list {sentinel}"
            );
        }
        assert_eq!(reachable, self.live, "live records not all reachable");
        assert_eq!(
            expired_reachable, self.expired_len,
            "expired counter out of sync with the expired queue"
        );

        let mut free = 0;
        let mut node = self.free_head;
        while node != NIL {
            assert!(
                self.slots[node as usize].entry.is_none(),
                "free slot {node} holds a record"
            );
            assert!(
                !self.slots[node as usize].expired,
                "free slot {node} carries an expired flag"
            );
            free += 1;
            node = self.slots[node as usize].next;
        }
        assert_eq!(
            free + reachable + FIRST_RECORD as usize,
            self.slots.len(),
            "slots leaked from both the free list and every list"
        );
    }
}

pub(crate) struct ListIter<'a, T> {
    arena: &'a Arena<T>,
    list: u32,
    node: u32,
}

impl<T> Iterator for ListIter<'_, T> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node == self.list {
            return None;
        }
        let node = self.node;
        self.node = self.arena.slots[node as usize].next;
        Some(node)
    }
}
