// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Arena-backed recency list.
//!
//! Nodes live in a slab and link to each other by index, so positions stay valid across
//! unrelated insertions and removals. Freed slots are recycled through a free list.

#![expect(
    clippy::cast_possible_truncation,
    reason = "NodeIndex is u32, which is sufficient for expected cache capacities"
)]

/// Index of a node in the recency list.
pub(crate) type NodeIndex = u32;

/// Sentinel value indicating no node.
const NULL_INDEX: NodeIndex = NodeIndex::MAX;

#[derive(Debug)]
struct Node<T> {
    entry: Option<T>,
    prev: NodeIndex,
    next: NodeIndex,
}

/// Doubly-linked list ordered from most recently used (head) to least recently used (tail).
#[derive(Debug)]
pub(crate) struct RecencyList<T> {
    nodes: Vec<Node<T>>,
    head: NodeIndex,
    tail: NodeIndex,
    free_head: NodeIndex,
    len: usize,
}

impl<T> RecencyList<T> {
    pub(crate) const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            head: NULL_INDEX,
            tail: NULL_INDEX,
            free_head: NULL_INDEX,
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the entry stored at `idx`, if the slot is in use.
    pub(crate) fn get(&self, idx: NodeIndex) -> Option<&T> {
        self.nodes.get(idx as usize)?.entry.as_ref()
    }

    /// Inserts `entry` as the most recently used and returns its position.
    pub(crate) fn push_front(&mut self, entry: T) -> NodeIndex {
        let idx = self.alloc(entry);
        self.link_front(idx);
        self.len += 1;
        idx
    }

    /// Removes the entry at `idx` and returns it.
    pub(crate) fn remove(&mut self, idx: NodeIndex) -> Option<T> {
        let entry = self.nodes.get_mut(idx as usize)?.entry.take()?;
        self.unlink(idx);
        self.free(idx);
        self.len -= 1;
        Some(entry)
    }

    /// Removes and returns the least recently used entry.
    pub(crate) fn pop_back(&mut self) -> Option<T> {
        if self.tail == NULL_INDEX {
            return None;
        }
        self.remove(self.tail)
    }

    /// Marks the entry at `idx` as the most recently used.
    pub(crate) fn move_to_front(&mut self, idx: NodeIndex) {
        if idx == self.head || self.get(idx).is_none() {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    /// Iterates entries from most to least recently used.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Removes every entry, returning them from most to least recently used.
    pub(crate) fn take_all(&mut self) -> Vec<T> {
        let mut entries = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while cursor != NULL_INDEX {
            let node = &mut self.nodes[cursor as usize];
            cursor = node.next;
            entries.extend(node.entry.take());
        }

        self.nodes.clear();
        self.head = NULL_INDEX;
        self.tail = NULL_INDEX;
        self.free_head = NULL_INDEX;
        self.len = 0;
        entries
    }

    fn alloc(&mut self, entry: T) -> NodeIndex {
        if self.free_head == NULL_INDEX {
            let idx = self.nodes.len() as NodeIndex;
            self.nodes.push(Node {
                entry: Some(entry),
                prev: NULL_INDEX,
                next: NULL_INDEX,
            });
            return idx;
        }

        let idx = self.free_head;
        let node = &mut self.nodes[idx as usize];
        self.free_head = node.next;
        node.entry = Some(entry);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;
        idx
    }

    fn free(&mut self, idx: NodeIndex) {
        let node = &mut self.nodes[idx as usize];
        node.prev = NULL_INDEX;
        node.next = self.free_head;
        self.free_head = idx;
    }

    fn link_front(&mut self, idx: NodeIndex) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx as usize];
            node.prev = NULL_INDEX;
            node.next = old_head;
        }

        if old_head == NULL_INDEX {
            self.tail = idx;
        } else {
            self.nodes[old_head as usize].prev = idx;
        }
        self.head = idx;
    }

    fn unlink(&mut self, idx: NodeIndex) {
        let (prev, next) = {
            let node = &self.nodes[idx as usize];
            (node.prev, node.next)
        };

        if prev == NULL_INDEX {
            self.head = next;
        } else {
            self.nodes[prev as usize].next = next;
        }

        if next == NULL_INDEX {
            self.tail = prev;
        } else {
            self.nodes[next as usize].prev = prev;
        }
    }
}

/// Iterator over a [`RecencyList`], most recently used first.
#[derive(Debug)]
pub(crate) struct Iter<'a, T> {
    list: &'a RecencyList<T>,
    cursor: NodeIndex,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.nodes.get(self.cursor as usize)?;
        self.cursor = node.next;
        node.entry.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(list: &RecencyList<i32>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn push_front_orders_most_recent_first() {
        let mut list = RecencyList::new();
        list.push_front(1);
        list.push_front(2);
        list.push_front(3);

        assert_eq!(order(&list), [3, 2, 1]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn move_to_front_promotes() {
        let mut list = RecencyList::new();
        let one = list.push_front(1);
        list.push_front(2);
        let three = list.push_front(3);

        list.move_to_front(one);
        assert_eq!(order(&list), [1, 3, 2]);

        list.move_to_front(three);
        assert_eq!(order(&list), [3, 1, 2]);
        assert_eq!(list.pop_back(), Some(2));
    }

    #[test]
    fn remove_middle_head_and_tail() {
        let mut list = RecencyList::new();
        let a = list.push_front(1);
        let b = list.push_front(2);
        let c = list.push_front(3);

        assert_eq!(list.remove(b), Some(2));
        assert_eq!(order(&list), [3, 1]);
        assert_eq!(list.remove(c), Some(3));
        assert_eq!(list.remove(a), Some(1));
        assert!(list.is_empty());
        assert_eq!(list.pop_back(), None);
    }

    #[test]
    fn removed_slot_is_recycled() {
        let mut list = RecencyList::new();
        let a = list.push_front(1);
        list.push_front(2);

        assert_eq!(list.remove(a), Some(1));
        assert_eq!(list.remove(a), None);
        assert!(list.get(a).is_none());

        let reused = list.push_front(3);
        assert_eq!(reused, a);
        assert_eq!(order(&list), [3, 2]);
    }

    #[test]
    fn take_all_empties_the_list() {
        let mut list = RecencyList::new();
        list.push_front(1);
        let two = list.push_front(2);
        list.push_front(3);
        list.move_to_front(two);

        assert_eq!(list.take_all(), [2, 3, 1]);
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);

        list.push_front(4);
        assert_eq!(order(&list), [4]);
    }
}
