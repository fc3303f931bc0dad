//! Model objects and the tree arena that stores them.
//!
//! Provides:
//! - [`ModelObject`] - Base trait all configurable model objects implement
//! - [`ModelKey`] - Stable arena handle for a model object
//! - [`ModelArena`] - Tree storage with parent-child relationships, ordered
//!   children and a caller-ordered root collection
//!
//! The arena is the concrete tree the extension subsystem's move handler
//! mutates. Root ordering is caller-supplied: [`ModelArena::insert_root`]
//! appends without sorting, while [`ModelArena::attach_root_ordered`] inserts
//! at the position given by the object's order field.

use std::any::Any;
use std::fmt;

use slotmap::{new_key_type, SlotMap};

use crate::error::{ModelError, Result};
use crate::logging::targets;
use crate::meta::ClassToken;

new_key_type! {
    /// A stable handle for a model object stored in a [`ModelArena`].
    ///
    /// Keys remain valid as the tree changes and become invalid when the
    /// object is removed.
    pub struct ModelKey;
}

/// Base trait for configurable model objects.
///
/// Order accessors have non-ordered defaults; position-aware objects
/// override both.
pub trait ModelObject: Any + Send + Sync {
    /// Returns the class token of this object's concrete type.
    fn class_token(&self) -> ClassToken;

    /// Returns the numeric order of this object, or `None` if the object is
    /// not position-aware.
    fn order(&self) -> Option<f64> {
        None
    }

    /// Sets the numeric order. Returns false if the object is not
    /// position-aware.
    fn set_order(&mut self, _order: f64) -> bool {
        false
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct ModelNode {
    object: Box<dyn ModelObject>,
    parent: Option<ModelKey>,
    children: Vec<ModelKey>,
}

/// Tree storage for model objects.
///
/// Children of every node are kept in insertion order until explicitly
/// sorted; the root collection is caller-ordered.
#[derive(Default)]
pub struct ModelArena {
    nodes: SlotMap<ModelKey, ModelNode>,
    roots: Vec<ModelKey>,
}

impl ModelArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            roots: Vec::new(),
        }
    }

    /// Inserts an object at root level, appending to the root collection.
    pub fn insert_root(&mut self, object: Box<dyn ModelObject>) -> ModelKey {
        let key = self.nodes.insert(ModelNode {
            object,
            parent: None,
            children: Vec::new(),
        });
        self.roots.push(key);
        tracing::trace!(target: targets::OBJECT, ?key, "inserted root model object");
        key
    }

    /// Inserts an object as the last child of `parent`.
    pub fn insert_child(
        &mut self,
        parent: ModelKey,
        object: Box<dyn ModelObject>,
    ) -> Result<ModelKey> {
        if !self.nodes.contains_key(parent) {
            return Err(ModelError::InvalidKey);
        }
        let key = self.nodes.insert(ModelNode {
            object,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(key);
        Ok(key)
    }

    /// Returns the stored object.
    pub fn object(&self, key: ModelKey) -> Option<&dyn ModelObject> {
        self.nodes.get(key).map(|n| &*n.object)
    }

    /// Returns the stored object mutably.
    pub fn object_mut(&mut self, key: ModelKey) -> Option<&mut (dyn ModelObject + 'static)> {
        self.nodes.get_mut(key).map(|n| &mut *n.object)
    }

    /// Returns the class token of the stored object.
    pub fn class_of(&self, key: ModelKey) -> Option<ClassToken> {
        self.nodes.get(key).map(|n| n.object.class_token())
    }

    /// Returns the parent of an object, or `None` for root-level objects.
    pub fn parent(&self, key: ModelKey) -> Option<ModelKey> {
        self.nodes.get(key).and_then(|n| n.parent)
    }

    /// Returns the children of an object.
    pub fn children(&self, key: ModelKey) -> &[ModelKey] {
        self.nodes.get(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Returns the root collection in its current order.
    pub fn roots(&self) -> &[ModelKey] {
        &self.roots
    }

    /// Returns every key in the arena, parents before children.
    pub fn all_keys(&self) -> Vec<ModelKey> {
        let mut keys = Vec::with_capacity(self.nodes.len());
        let mut work: Vec<ModelKey> = self.roots.clone();
        work.reverse();
        while let Some(key) = work.pop() {
            keys.push(key);
            let children = &self.nodes[key].children;
            work.extend(children.iter().rev().copied());
        }
        keys
    }

    /// Returns the ancestor class tokens of an object, innermost first.
    pub fn ancestor_tokens(&self, key: ModelKey) -> Vec<ClassToken> {
        let mut tokens = Vec::new();
        let mut current = self.parent(key);
        while let Some(p) = current {
            if let Some(token) = self.class_of(p) {
                tokens.push(token);
            }
            current = self.parent(p);
        }
        tokens
    }

    /// Returns the order field of the stored object.
    pub fn order_of(&self, key: ModelKey) -> Option<f64> {
        self.nodes.get(key).and_then(|n| n.object.order())
    }

    /// Sets the order field of the stored object.
    pub fn set_order(&mut self, key: ModelKey, order: f64) -> Result<()> {
        let node = self.nodes.get_mut(key).ok_or(ModelError::InvalidKey)?;
        if node.object.set_order(order) {
            Ok(())
        } else {
            Err(ModelError::NotOrdered {
                class_name: node.object.class_token().name(),
            })
        }
    }

    /// Detaches an object from its parent's children or from the root
    /// collection. The object itself stays in the arena.
    pub fn detach(&mut self, key: ModelKey) -> Result<()> {
        let node = self.nodes.get(key).ok_or(ModelError::InvalidKey)?;
        match node.parent {
            Some(parent) => {
                let siblings = &mut self.nodes[parent].children;
                siblings.retain(|&c| c != key);
                self.nodes[key].parent = None;
            }
            None => {
                self.roots.retain(|&r| r != key);
            }
        }
        Ok(())
    }

    /// Attaches a detached object as the last child of `parent`.
    ///
    /// Fails with [`ModelError::CircularParentage`] if `parent` is the object
    /// itself or one of its descendants.
    pub fn attach_child(&mut self, parent: ModelKey, child: ModelKey) -> Result<()> {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return Err(ModelError::InvalidKey);
        }
        // Walk up from the prospective parent looking for the child.
        let mut current = Some(parent);
        while let Some(p) = current {
            if p == child {
                return Err(ModelError::CircularParentage);
            }
            current = self.parent(p);
        }
        debug_assert!(self.nodes[child].parent.is_none(), "attach_child on attached object");
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    /// Attaches a detached object into the root collection at the position
    /// given by its order field. Objects without an order are appended.
    pub fn attach_root_ordered(&mut self, key: ModelKey) -> Result<()> {
        if !self.nodes.contains_key(key) {
            return Err(ModelError::InvalidKey);
        }
        let order = self.order_of(key);
        let position = match order {
            Some(order) => self
                .roots
                .iter()
                .position(|&r| self.order_of(r).is_some_and(|o| o > order))
                .unwrap_or(self.roots.len()),
            None => self.roots.len(),
        };
        self.roots.insert(position, key);
        Ok(())
    }

    /// Re-sorts the children of `parent` by their order fields.
    ///
    /// Children without an order sort after ordered ones, keeping their
    /// relative positions.
    pub fn sort_children(&mut self, parent: ModelKey) -> Result<()> {
        if !self.nodes.contains_key(parent) {
            return Err(ModelError::InvalidKey);
        }
        let mut children = std::mem::take(&mut self.nodes[parent].children);
        let orders: Vec<Option<f64>> = children.iter().map(|&c| self.order_of(c)).collect();
        let mut indexed: Vec<usize> = (0..children.len()).collect();
        indexed.sort_by(|&a, &b| match (orders[a], orders[b]) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        // Stable sort over the index vector keeps insertion order for ties.
        let sorted: Vec<ModelKey> = indexed.iter().map(|&i| children[i]).collect();
        children.clear();
        children.extend(sorted);
        self.nodes[parent].children = children;
        Ok(())
    }

    /// Returns the number of objects stored.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Debug for ModelArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArena")
            .field("len", &self.nodes.len())
            .field("roots", &self.roots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl ModelObject for Plain {
        fn class_token(&self) -> ClassToken {
            ClassToken::of::<Plain>()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Ordered {
        order: f64,
    }
    impl ModelObject for Ordered {
        fn class_token(&self) -> ClassToken {
            ClassToken::of::<Ordered>()
        }
        fn order(&self) -> Option<f64> {
            Some(self.order)
        }
        fn set_order(&mut self, order: f64) -> bool {
            self.order = order;
            true
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn ordered(order: f64) -> Box<dyn ModelObject> {
        Box::new(Ordered { order })
    }

    #[test]
    fn test_insert_and_parentage() {
        let mut arena = ModelArena::new();
        let root = arena.insert_root(Box::new(Plain));
        let child = arena.insert_child(root, Box::new(Plain)).unwrap();
        assert_eq!(arena.parent(child), Some(root));
        assert_eq!(arena.children(root), &[child]);
        assert_eq!(arena.roots(), &[root]);
    }

    #[test]
    fn test_detach_and_reattach() {
        let mut arena = ModelArena::new();
        let a = arena.insert_root(Box::new(Plain));
        let b = arena.insert_root(Box::new(Plain));
        let child = arena.insert_child(a, Box::new(Plain)).unwrap();

        arena.detach(child).unwrap();
        assert!(arena.children(a).is_empty());
        assert_eq!(arena.parent(child), None);

        arena.attach_child(b, child).unwrap();
        assert_eq!(arena.parent(child), Some(b));
    }

    #[test]
    fn test_circular_parentage_rejected() {
        let mut arena = ModelArena::new();
        let a = arena.insert_root(Box::new(Plain));
        let b = arena.insert_child(a, Box::new(Plain)).unwrap();
        arena.detach(a).unwrap();
        assert_eq!(arena.attach_child(b, a), Err(ModelError::CircularParentage));
        assert_eq!(arena.attach_child(a, a), Err(ModelError::CircularParentage));
    }

    #[test]
    fn test_attach_root_ordered_respects_order() {
        let mut arena = ModelArena::new();
        let first = arena.insert_root(ordered(1.0));
        let third = arena.insert_root(ordered(3.0));
        let second = arena.insert_root(ordered(2.0));

        arena.detach(second).unwrap();
        arena.attach_root_ordered(second).unwrap();
        assert_eq!(arena.roots(), &[first, second, third]);
    }

    #[test]
    fn test_sort_children_by_order() {
        let mut arena = ModelArena::new();
        let root = arena.insert_root(Box::new(Plain));
        let c3 = arena.insert_child(root, ordered(3.0)).unwrap();
        let c1 = arena.insert_child(root, ordered(1.0)).unwrap();
        let unordered = arena.insert_child(root, Box::new(Plain)).unwrap();
        let c2 = arena.insert_child(root, ordered(2.0)).unwrap();

        arena.sort_children(root).unwrap();
        assert_eq!(arena.children(root), &[c1, c2, c3, unordered]);
    }

    #[test]
    fn test_set_order_on_unordered_fails() {
        let mut arena = ModelArena::new();
        let key = arena.insert_root(Box::new(Plain));
        assert!(matches!(arena.set_order(key, 1.0), Err(ModelError::NotOrdered { .. })));
    }

    #[test]
    fn test_ancestor_tokens_innermost_first() {
        let mut arena = ModelArena::new();
        let root = arena.insert_root(Box::new(Plain));
        let mid = arena.insert_child(root, ordered(1.0)).unwrap();
        let leaf = arena.insert_child(mid, Box::new(Plain)).unwrap();

        let tokens = arena.ancestor_tokens(leaf);
        assert_eq!(tokens, vec![ClassToken::of::<Ordered>(), ClassToken::of::<Plain>()]);
    }

    #[test]
    fn test_all_keys_parents_before_children() {
        let mut arena = ModelArena::new();
        let a = arena.insert_root(Box::new(Plain));
        let b = arena.insert_root(Box::new(Plain));
        let a1 = arena.insert_child(a, Box::new(Plain)).unwrap();
        let keys = arena.all_keys();
        assert_eq!(keys, vec![a, a1, b]);
    }
}
