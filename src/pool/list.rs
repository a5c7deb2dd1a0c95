//! Intrusive index lists over the connection arena.
//!
//! A `List` owns no storage; it threads head/tail indexes through the link
//! pair of its `kind` inside each arena entry. One entry can therefore sit
//! on several lists at once (global idle + its per-address queue) and move
//! between them without touching the allocator.

use super::arena::{Arena, ConnId, Linked};

#[derive(Debug)]
pub(crate) struct List {
    kind: usize,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl List {
    pub(crate) fn new(kind: usize) -> Self {
        List {
            kind,
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn head_id<T: Linked>(&self, arena: &Arena<T>) -> Option<ConnId> {
        self.head.map(|index| arena.id_at(index))
    }

    pub(crate) fn tail_id<T: Linked>(&self, arena: &Arena<T>) -> Option<ConnId> {
        self.tail.map(|index| arena.id_at(index))
    }

    pub(crate) fn push_back<T: Linked>(&mut self, arena: &mut Arena<T>, id: ConnId) {
        let index = id.index;
        {
            let link = arena.by_index_mut(index).link_mut(self.kind);
            debug_assert!(!link.attached, "entry already on list {}", self.kind);
            link.prev = self.tail;
            link.next = None;
            link.attached = true;
        }
        match self.tail {
            Some(tail) => arena.by_index_mut(tail).link_mut(self.kind).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
    }

    pub(crate) fn pop_back<T: Linked>(&mut self, arena: &mut Arena<T>) -> Option<ConnId> {
        let id = self.tail_id(arena)?;
        self.remove(arena, id);
        Some(id)
    }

    /// Unlink `id` from this list. The entry must be attached.
    pub(crate) fn remove<T: Linked>(&mut self, arena: &mut Arena<T>, id: ConnId) {
        let index = id.index;
        let link = {
            let link = arena.by_index_mut(index).link_mut(self.kind);
            debug_assert!(link.attached, "entry not on list {}", self.kind);
            std::mem::take(link)
        };
        match link.prev {
            Some(prev) => arena.by_index_mut(prev).link_mut(self.kind).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => arena.by_index_mut(next).link_mut(self.kind).prev = link.prev,
            None => self.tail = link.prev,
        }
        self.len -= 1;
    }

    /// Whether `id` is currently attached to a list of this kind.
    pub(crate) fn contains<T: Linked>(&self, arena: &Arena<T>, id: ConnId) -> bool {
        arena.get(id).is_some_and(|entry| entry.link(self.kind).attached)
    }

    #[cfg(test)]
    pub(crate) fn iter_ids<T: Linked>(&self, arena: &Arena<T>) -> Vec<ConnId> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            out.push(arena.id_at(index));
            cursor = arena.by_index(index).link(self.kind).next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::arena::{Link, LINKS, LINK_ADDR, LINK_IDLE},
        *,
    };

    struct Plain(u32, [Link; LINKS]);

    impl Linked for Plain {
        fn link(&self, kind: usize) -> &Link {
            &self.1[kind]
        }
        fn link_mut(&mut self, kind: usize) -> &mut Link {
            &mut self.1[kind]
        }
    }

    fn setup(n: u32) -> (Arena<Plain>, Vec<ConnId>) {
        let mut arena = Arena::new();
        let ids = (0..n)
            .map(|v| arena.insert(Plain(v, Default::default())))
            .collect();
        (arena, ids)
    }

    #[test]
    fn fifo_order_and_middle_removal() {
        let (mut arena, ids) = setup(3);
        let mut list = List::new(LINK_IDLE);
        for &id in &ids {
            list.push_back(&mut arena, id);
        }
        assert_eq!(list.head_id(&arena), Some(ids[0]));
        assert_eq!(list.tail_id(&arena), Some(ids[2]));

        list.remove(&mut arena, ids[1]);
        assert_eq!(list.iter_ids(&arena), vec![ids[0], ids[2]]);

        assert_eq!(list.pop_back(&mut arena), Some(ids[2]));
        assert_eq!(list.pop_back(&mut arena), Some(ids[0]));
        assert_eq!(list.pop_back(&mut arena), None);
        assert!(list.is_empty());
    }

    #[test]
    fn one_entry_on_two_list_kinds() {
        let (mut arena, ids) = setup(2);
        let mut idle = List::new(LINK_IDLE);
        let mut queue = List::new(LINK_ADDR);
        for &id in &ids {
            idle.push_back(&mut arena, id);
            queue.push_back(&mut arena, id);
        }
        // Removing from one kind leaves the other membership intact.
        idle.remove(&mut arena, ids[0]);
        assert!(!idle.contains(&arena, ids[0]));
        assert!(queue.contains(&arena, ids[0]));
        assert_eq!(queue.iter_ids(&arena), ids);
    }

    #[test]
    fn head_tracks_removals_at_both_ends() {
        let (mut arena, ids) = setup(4);
        let mut list = List::new(LINK_IDLE);
        for &id in &ids {
            list.push_back(&mut arena, id);
        }
        list.remove(&mut arena, ids[0]);
        assert_eq!(list.head_id(&arena), Some(ids[1]));
        list.remove(&mut arena, ids[3]);
        assert_eq!(list.tail_id(&arena), Some(ids[2]));
        assert_eq!(list.len(), 2);
    }
}
