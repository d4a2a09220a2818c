//! # rbtree-rs
//!
//! An ordered container of scalar keys backed by a red-black tree.
//!
//! Nodes live in a slot arena owned by the tree. Slot 0 is a permanently black
//! sentinel that stands in for every absent child and for the root's parent, so
//! the balancing code never special-cases a missing link. Search, insertion and
//! removal are O(log n) whatever the insertion order.
//!
//! Equal keys are kept: a duplicate is routed into the right subtree of its
//! equals, and all copies come back adjacent in sorted order.
//!
//! ## Example
//!
//! ```rust
//! use rbtree_rs::RbTree;
//!
//! let mut tree = RbTree::new();
//! for key in [10, 20, 5, 15, 25] {
//!     tree.insert(key);
//! }
//! assert_eq!(tree.to_sorted_vec(8), vec![5, 10, 15, 20, 25]);
//!
//! let ten = tree.find(10).unwrap();
//! assert_eq!(tree.erase(ten), Ok(10));
//! assert_eq!(tree.to_sorted_vec(8), vec![5, 15, 20, 25]);
//! ```

#![forbid(unsafe_code)]

mod error;

pub use error::EraseError;

use log::{debug, trace};
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// The key type stored in the tree.
pub type Key = i32;

// =============================================================================
// Configuration
// =============================================================================

const SENTINEL_SLOT: u32 = 0;
const MAX_SLOTS: usize = u32::MAX as usize;
// Tree height is at most 2*log2(n + 1), so 64 entries hold any path in a tree
// addressable by `u32` slots.
const EXPORT_STACK_HINT: usize = 64;

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

fn next_tree_id() -> u64 {
    NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Colors, sides and links
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    #[inline]
    fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Arena slot index. `Link::NIL` is the sentinel, compared by identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Link(u32);

impl Link {
    const NIL: Link = Link(SENTINEL_SLOT);

    #[inline]
    fn is_nil(self) -> bool {
        self.0 == SENTINEL_SLOT
    }

    #[inline]
    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a node, returned by [`RbTree::insert`], [`RbTree::find`],
/// [`RbTree::min`] and [`RbTree::max`].
///
/// A handle stays valid until its node is erased or the tree is cleared.
/// Passing an invalid handle to [`RbTree::erase`] is reported as an
/// [`EraseError`] instead of corrupting the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    tree: u64,
    slot: u32,
    generation: u32,
}

// =============================================================================
// Node arena
// =============================================================================

#[derive(Clone, Debug)]
struct Node {
    key: Key,
    color: Color,
    /// Owning links, indexed by `Side`.
    children: [Link; 2],
    /// Back-reference only; never used to release anything.
    parent: Link,
    /// Bumped every time the slot is released, so old handles go stale.
    generation: u32,
    live: bool,
}

impl Node {
    fn sentinel() -> Self {
        Self {
            key: 0,
            color: Color::Black,
            children: [Link::NIL, Link::NIL],
            parent: Link::NIL,
            generation: 0,
            live: false,
        }
    }
}

#[derive(Clone)]
struct NodeArena {
    nodes: Vec<Node>,
    free: Vec<u32>,
    /// Slots whose generation ran out; never handed out again.
    retired: usize,
}

impl NodeArena {
    fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.saturating_add(1));
        nodes.push(Node::sentinel());
        Self {
            nodes,
            free: Vec::new(),
            retired: 0,
        }
    }

    /// Stores a fresh red leaf and returns its slot.
    fn alloc(&mut self, key: Key, parent: Link) -> Link {
        if let Some(slot) = self.free.pop() {
            let node = &mut self.nodes[slot as usize];
            debug_assert!(!node.live);
            node.key = key;
            node.color = Color::Red;
            node.children = [Link::NIL, Link::NIL];
            node.parent = parent;
            node.live = true;
            return Link(slot);
        }

        assert!(self.nodes.len() < MAX_SLOTS, "node arena exhausted");
        let slot = self.nodes.len() as u32;
        self.nodes.push(Node {
            key,
            color: Color::Red,
            children: [Link::NIL, Link::NIL],
            parent,
            generation: 0,
            live: true,
        });
        Link(slot)
    }

    /// Releases a slot and returns the key it held.
    ///
    /// A slot whose generation cannot advance any further is retired instead of
    /// reused, so no old handle can match it again.
    fn release(&mut self, link: Link) -> Key {
        debug_assert!(!link.is_nil());
        let node = &mut self.nodes[link.slot()];
        debug_assert!(node.live);
        node.live = false;
        node.children = [Link::NIL, Link::NIL];
        node.parent = Link::NIL;
        match node.generation.checked_add(1) {
            Some(generation) => {
                node.generation = generation;
                self.free.push(link.0);
            }
            None => self.retired += 1,
        }
        node.key
    }

    /// Drops every node except the sentinel.
    fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[SENTINEL_SLOT as usize] = Node::sentinel();
        self.free.clear();
        self.retired = 0;
    }

    fn get(&self, link: Link) -> Option<&Node> {
        self.nodes.get(link.slot())
    }

    fn reserve(&mut self, additional: usize) {
        let spare = self.free.len();
        self.nodes.reserve(additional.saturating_sub(spare));
    }

    fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
        self.free.shrink_to_fit();
    }

    fn memory_usage(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Node>()
            + self.free.capacity() * std::mem::size_of::<u32>()
    }
}

impl Index<Link> for NodeArena {
    type Output = Node;

    fn index(&self, link: Link) -> &Node {
        &self.nodes[link.slot()]
    }
}

impl IndexMut<Link> for NodeArena {
    fn index_mut(&mut self, link: Link) -> &mut Node {
        &mut self.nodes[link.slot()]
    }
}

// =============================================================================
// Tree
// =============================================================================

/// A red-black tree of [`Key`]s.
pub struct RbTree {
    id: u64,
    arena: NodeArena,
    root: Link,
    len: usize,
}

impl RbTree {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty tree with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: next_tree_id(),
            arena: NodeArena::with_capacity(capacity),
            root: Link::NIL,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_nil()
    }

    /// Bytes held by the node arena, including spare capacity.
    pub fn memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }

    /// Makes room for at least `additional` more nodes.
    pub fn reserve(&mut self, additional: usize) {
        self.arena.reserve(additional);
    }

    /// Releases spare arena capacity. Live handles stay valid.
    pub fn shrink_to_fit(&mut self) {
        self.arena.shrink_to_fit();
    }

    /// Removes every node at once.
    ///
    /// All handles issued before the call become foreign to this tree.
    pub fn clear(&mut self) {
        debug!("clearing tree {} with {} nodes", self.id, self.len);
        self.arena.clear();
        self.root = Link::NIL;
        self.len = 0;
        self.id = next_tree_id();
    }

    #[inline]
    fn handle(&self, link: Link) -> NodeRef {
        NodeRef {
            tree: self.id,
            slot: link.0,
            generation: self.arena[link].generation,
        }
    }

    fn resolve(&self, node: NodeRef) -> error::Result<Link> {
        if node.tree != self.id {
            return Err(EraseError::ForeignHandle);
        }
        let link = Link(node.slot);
        match self.arena.get(link) {
            Some(n) if !link.is_nil() && n.live && n.generation == node.generation => Ok(link),
            _ => Err(EraseError::StaleHandle),
        }
    }

    #[inline]
    fn parent(&self, x: Link) -> Link {
        self.arena[x].parent
    }

    #[inline]
    fn child(&self, x: Link, side: Side) -> Link {
        self.arena[x].children[side as usize]
    }

    #[inline]
    fn set_child(&mut self, x: Link, side: Side, child: Link) {
        self.arena[x].children[side as usize] = child;
    }

    #[inline]
    fn color(&self, x: Link) -> Color {
        self.arena[x].color
    }

    #[inline]
    fn is_red(&self, x: Link) -> bool {
        self.arena[x].color == Color::Red
    }

    #[inline]
    fn set_color(&mut self, x: Link, color: Color) {
        debug_assert!(!x.is_nil() || color == Color::Black, "sentinel must stay black");
        self.arena[x].color = color;
    }

    /// Which side of its parent `x` hangs on. `x` may be the sentinel, in which
    /// case its parent field must have just been set by a transplant.
    #[inline]
    fn side_of(&self, x: Link) -> Side {
        if self.child(self.parent(x), Side::Left) == x {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// Walks from `x` as far as possible toward `side`. `x` must not be the sentinel.
    fn subtree_edge(&self, mut x: Link, side: Side) -> Link {
        debug_assert!(!x.is_nil());
        loop {
            let next = self.child(x, side);
            if next.is_nil() {
                return x;
            }
            x = next;
        }
    }

    // =========================================================================
    // Rotations and transplant
    // =========================================================================

    /// Puts `v` where `u` is. `v.parent` is written even when `v` is the sentinel.
    fn transplant(&mut self, u: Link, v: Link) {
        let parent = self.parent(u);
        if parent.is_nil() {
            self.root = v;
        } else {
            let side = self.side_of(u);
            self.set_child(parent, side, v);
        }
        self.arena[v].parent = parent;
    }

    /// Moves `x` one level down toward `side`; its child on the other side takes
    /// its place. `Side::Left` is a left rotation.
    fn rotate(&mut self, x: Link, side: Side) {
        let up = side.opposite();
        let y = self.child(x, up);
        debug_assert!(!y.is_nil(), "rotation needs a child to lift");
        trace!("rotate {:?} at slot {}", side, x.0);

        let inner = self.child(y, side);
        self.set_child(x, up, inner);
        if !inner.is_nil() {
            self.arena[inner].parent = x;
        }
        self.transplant(x, y);
        self.set_child(y, side, x);
        self.arena[x].parent = y;
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts `key` and returns a handle to its node.
    ///
    /// Duplicates are accepted and placed after their equals.
    pub fn insert(&mut self, key: Key) -> NodeRef {
        let mut parent = Link::NIL;
        let mut side = Side::Left;
        let mut cur = self.root;
        while !cur.is_nil() {
            parent = cur;
            side = if key < self.arena[cur].key {
                Side::Left
            } else {
                Side::Right
            };
            cur = self.child(cur, side);
        }

        let z = self.arena.alloc(key, parent);
        if parent.is_nil() {
            self.root = z;
        } else {
            self.set_child(parent, side, z);
        }
        self.len += 1;

        self.insert_fixup(z);
        self.handle(z)
    }

    fn insert_fixup(&mut self, mut z: Link) {
        while self.is_red(self.parent(z)) {
            let p = self.parent(z);
            let g = self.parent(p);
            let side = self.side_of(p);
            let uncle = self.child(g, side.opposite());

            if self.is_red(uncle) {
                trace!("insert fixup: red uncle under slot {}", g.0);
                self.set_color(p, Color::Black);
                self.set_color(uncle, Color::Black);
                self.set_color(g, Color::Red);
                z = g;
                continue;
            }

            if z == self.child(p, side.opposite()) {
                trace!("insert fixup: inner grandchild at slot {}", z.0);
                z = p;
                self.rotate(z, side);
            }

            trace!("insert fixup: outer grandchild at slot {}", z.0);
            let p = self.parent(z);
            let g = self.parent(p);
            self.set_color(p, Color::Black);
            self.set_color(g, Color::Red);
            self.rotate(g, side.opposite());
        }

        let root = self.root;
        self.set_color(root, Color::Black);
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Finds a node holding `key`. With duplicates, any one of them may be returned.
    pub fn find(&self, key: Key) -> Option<NodeRef> {
        let mut cur = self.root;
        while !cur.is_nil() {
            let node = &self.arena[cur];
            cur = match key.cmp(&node.key) {
                std::cmp::Ordering::Equal => return Some(self.handle(cur)),
                std::cmp::Ordering::Less => node.children[Side::Left as usize],
                std::cmp::Ordering::Greater => node.children[Side::Right as usize],
            };
        }
        None
    }

    pub fn contains(&self, key: Key) -> bool {
        self.find(key).is_some()
    }

    pub fn min(&self) -> Option<NodeRef> {
        self.edge(Side::Left)
    }

    pub fn max(&self) -> Option<NodeRef> {
        self.edge(Side::Right)
    }

    fn edge(&self, side: Side) -> Option<NodeRef> {
        if self.root.is_nil() {
            return None;
        }
        Some(self.handle(self.subtree_edge(self.root, side)))
    }

    /// The key behind `node`, or `None` if the handle is not live in this tree.
    pub fn key(&self, node: NodeRef) -> Option<Key> {
        self.resolve(node).ok().map(|link| self.arena[link].key)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes the node behind `node` and returns its key.
    pub fn erase(&mut self, node: NodeRef) -> error::Result<Key> {
        let p = match self.resolve(node) {
            Ok(link) => link,
            Err(err) => {
                debug!("rejected erase of {:?}: {}", node, err);
                return Err(err);
            }
        };

        let left = self.child(p, Side::Left);
        let right = self.child(p, Side::Right);
        let mut excised_color = self.color(p);
        let x = if left.is_nil() {
            self.transplant(p, right);
            right
        } else if right.is_nil() {
            self.transplant(p, left);
            left
        } else {
            let y = self.subtree_edge(right, Side::Left);
            excised_color = self.color(y);
            let x = self.child(y, Side::Right);
            if self.parent(y) == p {
                self.arena[x].parent = y;
            } else {
                self.transplant(y, x);
                self.set_child(y, Side::Right, right);
                self.arena[right].parent = y;
            }
            self.transplant(p, y);
            self.set_child(y, Side::Left, left);
            self.arena[left].parent = y;
            let color = self.color(p);
            self.set_color(y, color);
            x
        };

        if excised_color == Color::Black {
            self.erase_fixup(x);
        }
        self.arena[Link::NIL].parent = Link::NIL;
        self.len -= 1;
        Ok(self.arena.release(p))
    }

    /// `x` carries one missing black unit on every path through it.
    fn erase_fixup(&mut self, mut x: Link) {
        while x != self.root && !self.is_red(x) {
            let p = self.parent(x);
            let side = self.side_of(x);
            let far = side.opposite();
            let mut w = self.child(p, far);

            if self.is_red(w) {
                trace!("erase fixup: red sibling at slot {}", w.0);
                self.set_color(w, Color::Black);
                self.set_color(p, Color::Red);
                self.rotate(p, side);
                w = self.child(p, far);
            }

            let near_nephew = self.child(w, side);
            let far_nephew = self.child(w, far);
            if !self.is_red(near_nephew) && !self.is_red(far_nephew) {
                trace!("erase fixup: black nephews under slot {}", w.0);
                self.set_color(w, Color::Red);
                x = p;
                continue;
            }

            if !self.is_red(far_nephew) {
                trace!("erase fixup: red near nephew at slot {}", near_nephew.0);
                self.set_color(near_nephew, Color::Black);
                self.set_color(w, Color::Red);
                self.rotate(w, far);
                w = self.child(p, far);
            }

            trace!("erase fixup: red far nephew under slot {}", w.0);
            let parent_color = self.color(p);
            self.set_color(w, parent_color);
            self.set_color(p, Color::Black);
            let far_nephew = self.child(w, far);
            self.set_color(far_nephew, Color::Black);
            self.rotate(p, side);
            x = self.root;
        }
        self.set_color(x, Color::Black);
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Writes the smallest keys in ascending order into `out` and returns how
    /// many were written: `min(self.len(), out.len())`.
    pub fn write_sorted(&self, out: &mut [Key]) -> usize {
        if self.root.is_nil() || out.is_empty() {
            return 0;
        }
        let mut written = 0;
        for (slot, key) in out.iter_mut().zip(self.iter()) {
            *slot = key;
            written += 1;
        }
        written
    }

    /// The smallest `capacity` keys in ascending order.
    pub fn to_sorted_vec(&self, capacity: usize) -> Vec<Key> {
        self.iter().take(capacity).collect()
    }

    /// Iterates over all keys in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::with_capacity(EXPORT_STACK_HINT.min(self.len)),
            remaining: self.len,
        };
        iter.push_left_spine(self.root);
        iter
    }
}

impl Default for RbTree {
    fn default() -> Self {
        Self::new()
    }
}

/// The clone is a separate tree: handles from the source are foreign to it.
impl Clone for RbTree {
    fn clone(&self) -> Self {
        Self {
            id: next_tree_id(),
            arena: self.arena.clone(),
            root: self.root,
            len: self.len,
        }
    }
}

impl std::fmt::Debug for RbTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Extend<Key> for RbTree {
    fn extend<I: IntoIterator<Item = Key>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for key in iter {
            self.insert(key);
        }
    }
}

impl FromIterator<Key> for RbTree {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut tree = RbTree::new();
        tree.extend(iter);
        tree
    }
}

impl<'a> IntoIterator for &'a RbTree {
    type Item = Key;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// In-order iterator over the keys of an [`RbTree`].
pub struct Iter<'a> {
    tree: &'a RbTree,
    stack: Vec<Link>,
    remaining: usize,
}

impl Iter<'_> {
    fn push_left_spine(&mut self, mut x: Link) {
        while !x.is_nil() {
            self.stack.push(x);
            x = self.tree.child(x, Side::Left);
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = Key;

    fn next(&mut self) -> Option<Key> {
        let x = self.stack.pop()?;
        self.push_left_spine(self.tree.child(x, Side::Right));
        self.remaining -= 1;
        Some(self.tree.arena[x].key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}


#[cfg(test)]
mod proptests;
