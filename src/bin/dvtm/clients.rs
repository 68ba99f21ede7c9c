//! Ordered client registry: an arena with doubly-linked indices instead
//! of raw pointers, plus the attach/detach/reorder primitives and the
//! monotonic id allocator.

use crate::layout::Rect;
use dvtm::vt::Vt;
use std::os::unix::io::RawFd;

/// Display titles are capped at 254 bytes of UTF-8.
const TITLE_MAX: usize = 254;

pub struct Client {
    pub id: u16,
    pub cmd: String,
    pub title: String,
    pub rect: Rect,
    pub minimized: bool,
    pub died: bool,
    pub term: Vt,
}

impl Client {
    pub fn pid(&self) -> libc::pid_t {
        self.term.pid()
    }

    pub fn pty_fd(&self) -> RawFd {
        self.term.pty_fd()
    }

    pub fn set_title(&mut self, title: &str) {
        let mut end = title.len().min(TITLE_MAX);
        while !title.is_char_boundary(end) {
            end -= 1;
        }
        self.title = title[..end].to_string();
    }
}

struct Node<T> {
    value: T,
    order: u32,
    next: Option<usize>,
    prev: Option<usize>,
}

/// Arena-backed ordered list. Slots are reused, list order is explicit
/// through the links, and `order` values along the list are always the
/// strictly increasing sequence `1..=len`.
pub struct OrderedArena<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
}

impl<T> Default for OrderedArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedArena<T> {
    pub fn new() -> Self {
        OrderedArena {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
        }
    }

    fn node(&self, idx: usize) -> &Node<T> {
        self.slots[idx].as_ref().expect("live arena slot")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<T> {
        self.slots[idx].as_mut().expect("live arena slot")
    }

    /// Store a value without linking it; pair with `attach`/`attach_after`.
    pub fn insert(&mut self, value: T) -> usize {
        let node = Node {
            value,
            order: 0,
            next: None,
            prev: None,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Prepend to the list and renumber everything from 1.
    pub fn attach(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(idx);
        }
        {
            let node = self.node_mut(idx);
            node.next = old_head;
            node.prev = None;
        }
        self.head = Some(idx);
        self.renumber_from(Some(idx), 1);
    }

    /// Insert after `after` (or at the tail when `after` is `None`) and
    /// renumber from the insertion point onward.
    pub fn attach_after(&mut self, idx: usize, after: Option<usize>) {
        if after == Some(idx) {
            return;
        }
        let after = after.or_else(|| self.tail());
        let Some(a) = after else {
            // Empty list: degenerates to a plain attach.
            self.attach(idx);
            return;
        };
        let a_next = self.node(a).next;
        if let Some(n) = a_next {
            self.node_mut(n).prev = Some(idx);
        }
        {
            let node = self.node_mut(idx);
            node.next = a_next;
            node.prev = Some(a);
        }
        self.node_mut(a).next = Some(idx);
        let start = self.node(a).order + 1;
        self.renumber_from(Some(idx), start);
    }

    /// Unlink from the list; the slot stays allocated so the value can
    /// still be inspected or re-attached.
    pub fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        if let Some(p) = prev {
            self.node_mut(p).next = next;
        }
        if let Some(n) = next {
            self.node_mut(n).prev = prev;
            let mut cur = Some(n);
            while let Some(c) = cur {
                self.node_mut(c).order -= 1;
                cur = self.node(c).next;
            }
        }
        if self.head == Some(idx) {
            self.head = next;
        }
        let node = self.node_mut(idx);
        node.next = None;
        node.prev = None;
        node.order = 0;
    }

    /// Detach and free the slot, returning the value.
    pub fn remove(&mut self, idx: usize) -> T {
        self.detach(idx);
        let node = self.slots[idx].take().expect("live arena slot");
        self.free.push(idx);
        node.value
    }

    fn renumber_from(&mut self, start: Option<usize>, first_order: u32) {
        let mut order = first_order;
        let mut cur = start;
        while let Some(idx) = cur {
            self.node_mut(idx).order = order;
            order += 1;
            cur = self.node(idx).next;
        }
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Whether `idx` still names a live (allocated) slot.
    pub fn contains(&self, idx: usize) -> bool {
        idx < self.slots.len() && self.slots[idx].is_some()
    }

    pub fn tail(&self) -> Option<usize> {
        let mut cur = self.head?;
        while let Some(next) = self.node(cur).next {
            cur = next;
        }
        Some(cur)
    }

    pub fn next_of(&self, idx: usize) -> Option<usize> {
        self.node(idx).next
    }

    pub fn prev_of(&self, idx: usize) -> Option<usize> {
        self.node(idx).prev
    }

    pub fn order_of(&self, idx: usize) -> u32 {
        self.node(idx).order
    }

    pub fn get(&self, idx: usize) -> &T {
        &self.node(idx).value
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        &mut self.node_mut(idx).value
    }

    /// Linked indices in list order.
    pub fn indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while let Some(idx) = cur {
            out.push(idx);
            cur = self.node(idx).next;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.indices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Monotonic non-zero id allocator; ids are never reused because event
/// FIFO consumers may cache them.
#[derive(Default)]
pub struct IdAlloc {
    last: u16,
}

impl IdAlloc {
    pub fn next(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1).max(1);
        self.last
    }
}

pub type ClientList = OrderedArena<Client>;

impl ClientList {
    pub fn by_pid(&self, pid: libc::pid_t) -> Option<usize> {
        self.indices().into_iter().find(|&i| self.get(i).pid() == pid)
    }

    pub fn by_id(&self, id: u16) -> Option<usize> {
        self.indices().into_iter().find(|&i| self.get(i).id == id)
    }

    pub fn by_order(&self, order: u32) -> Option<usize> {
        self.indices()
            .into_iter()
            .find(|&i| self.order_of(i) == order)
    }

    pub fn by_coord(&self, x: u16, y: u16) -> Option<usize> {
        self.indices()
            .into_iter()
            .find(|&i| self.get(i).rect.contains(x, y))
    }

    pub fn count_visible(&self) -> usize {
        self.indices()
            .into_iter()
            .filter(|&i| !self.get(i).minimized)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn orders(arena: &OrderedArena<char>) -> Vec<u32> {
        arena
            .indices()
            .into_iter()
            .map(|i| arena.order_of(i))
            .collect()
    }

    fn values(arena: &OrderedArena<char>) -> Vec<char> {
        arena.indices().into_iter().map(|i| *arena.get(i)).collect()
    }

    #[test]
    fn attach_prepends_and_renumbers() {
        let mut arena = OrderedArena::new();
        for c in ['a', 'b', 'c'] {
            let idx = arena.insert(c);
            arena.attach(idx);
        }
        assert_eq!(values(&arena), vec!['c', 'b', 'a']);
        assert_eq!(orders(&arena), vec![1, 2, 3]);
    }

    #[test]
    fn attach_after_inserts_mid_list() {
        let mut arena = OrderedArena::new();
        let a = arena.insert('a');
        arena.attach(a);
        let b = arena.insert('b');
        arena.attach_after(b, Some(a));
        let c = arena.insert('c');
        arena.attach_after(c, Some(a));
        assert_eq!(values(&arena), vec!['a', 'c', 'b']);
        assert_eq!(orders(&arena), vec![1, 2, 3]);
    }

    #[test]
    fn attach_after_none_appends_at_tail() {
        let mut arena = OrderedArena::new();
        let a = arena.insert('a');
        arena.attach(a);
        let b = arena.insert('b');
        arena.attach_after(b, None);
        assert_eq!(values(&arena), vec!['a', 'b']);
    }

    #[test]
    fn detach_decrements_successors() {
        let mut arena = OrderedArena::new();
        let mut idxs = Vec::new();
        for c in ['c', 'b', 'a'] {
            let idx = arena.insert(c);
            arena.attach(idx);
        }
        for i in arena.indices() {
            idxs.push(i);
        }
        arena.detach(idxs[1]);
        assert_eq!(values(&arena), vec!['a', 'c']);
        assert_eq!(orders(&arena), vec![1, 2]);
    }

    #[test]
    fn remove_recycles_slots() {
        let mut arena = OrderedArena::new();
        let a = arena.insert('a');
        arena.attach(a);
        assert_eq!(arena.remove(a), 'a');
        let b = arena.insert('b');
        assert_eq!(b, a, "freed slot should be reused");
    }

    #[test]
    fn id_alloc_is_monotonic_and_nonzero() {
        let mut ids = IdAlloc::default();
        let first = ids.next();
        let second = ids.next();
        assert!(first >= 1);
        assert!(second > first);
    }

    // The focus-cycling step: next in list order, wrapping to the head.
    fn cycle_next(arena: &OrderedArena<bool>, idx: usize) -> usize {
        arena
            .next_of(idx)
            .or_else(|| arena.head())
            .expect("non-empty list")
    }

    // Skip-minimized variant; values are the minimized flags.
    fn cycle_next_nm(arena: &OrderedArena<bool>, sel: usize) -> usize {
        let mut c = sel;
        loop {
            c = cycle_next(arena, c);
            if !*arena.get(c) || c == sel {
                return c;
            }
        }
    }

    #[test]
    fn focusnext_applied_n_times_returns_to_start() {
        let mut arena = OrderedArena::new();
        let mut idxs = Vec::new();
        for _ in 0..5 {
            let idx = arena.insert(false);
            arena.attach(idx);
            idxs.push(idx);
        }
        for &start in &idxs {
            let mut cur = start;
            for _ in 0..arena.len() {
                cur = cycle_next(&arena, cur);
            }
            assert_eq!(cur, start);
        }
    }

    proptest! {
        // focusnextnm never lands on a minimized client while any
        // non-minimized one exists.
        #[test]
        fn next_nm_skips_minimized(flags in proptest::collection::vec(any::<bool>(), 2..10)) {
            prop_assume!(flags.iter().any(|m| !m));
            let mut arena = OrderedArena::new();
            let mut idxs = Vec::new();
            for &minimized in &flags {
                let idx = arena.insert(minimized);
                arena.attach(idx);
                idxs.push(idx);
            }
            for &start in &idxs {
                let got = cycle_next_nm(&arena, start);
                prop_assert!(!*arena.get(got));
            }
        }
    }

    proptest! {
        // Invariant: after any sequence of attach/detach/attach_after,
        // orders along the list are 1, 2, ..., n without gaps.
        #[test]
        fn orders_stay_dense(ops in proptest::collection::vec(0u8..3, 1..64)) {
            let mut arena = OrderedArena::new();
            let mut live: Vec<usize> = Vec::new();
            let mut detached: Vec<usize> = Vec::new();
            let mut counter = 0u32;
            for op in ops {
                match op {
                    0 => {
                        counter += 1;
                        let idx = arena.insert(char::from(b'a' + (counter % 26) as u8));
                        arena.attach(idx);
                        live.push(idx);
                    }
                    1 => {
                        if let Some(idx) = live.pop() {
                            arena.detach(idx);
                            detached.push(idx);
                        }
                    }
                    _ => {
                        if let Some(idx) = detached.pop() {
                            let after = live.first().copied();
                            arena.attach_after(idx, after);
                            live.push(idx);
                        }
                    }
                }
                let got = orders(&arena);
                let want: Vec<u32> = (1..=got.len() as u32).collect();
                prop_assert_eq!(got, want);
            }
        }
    }
}
