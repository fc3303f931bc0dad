//! Applying registered moves to a concrete model object tree.
//!
//! The registry only stores and merges move registrations; this module
//! walks an actual tree, resolves the merged [`MoveDescriptor`] for every
//! object, and rewires parent/child edges accordingly. The tree is accessed
//! through the [`ModelTreeAdapter`] trait so the handler works for any tree
//! shape; [`ModelArena`] implements it directly.
//!
//! Moves whose target container is not present in the processed batch are
//! collected and reported once at the end, after every resolvable move has
//! been applied.

use trellis_core::meta::{ClassToken, move_to_root_token};
use trellis_core::object::{ModelArena, ModelKey};

use crate::error::{ExtensionError, Result};
use crate::identifier::ClassIdentifier;
use crate::logging::targets;
use crate::registry::ExtensionRegistry;

/// The merged outcome of all move registrations applying to one model
/// class. `None` fields mean "unchanged".
#[derive(Debug, Clone, PartialEq)]
pub struct MoveDescriptor {
    /// The new container identifier, or `None` to stay put.
    pub new_container: Option<ClassIdentifier>,
    /// The new order, or `None` to keep the current order.
    pub new_order: Option<f64>,
}

impl MoveDescriptor {
    /// True when the descriptor requests a move to the tree root.
    pub fn is_move_to_root(&self) -> bool {
        self.new_container
            .as_ref()
            .is_some_and(|c| c.last_segment() == move_to_root_token())
    }
}

/// Tree access needed by the move handler.
///
/// Mutating operations report success as a bool; a stale handle is treated
/// as "nothing to do" rather than a fault, since the batch may legitimately
/// contain objects removed by an earlier move.
pub trait ModelTreeAdapter {
    /// Opaque object handle.
    type Handle: Copy + Eq + std::fmt::Debug;

    /// The class of the object, or `None` for a stale handle.
    fn class_of(&self, handle: Self::Handle) -> Option<ClassToken>;

    /// The current parent, or `None` at the root.
    fn parent_of(&self, handle: Self::Handle) -> Option<Self::Handle>;

    /// Class tokens of the containment chain, innermost first.
    fn ancestors_of(&self, handle: Self::Handle) -> Vec<ClassToken>;

    /// Applies a new order to the object.
    fn set_order(&mut self, handle: Self::Handle, order: f64) -> bool;

    /// Detaches the object from its parent or from the root list.
    fn detach(&mut self, handle: Self::Handle) -> bool;

    /// Attaches a detached object under a new parent.
    fn attach_child(&mut self, parent: Self::Handle, child: Self::Handle) -> bool;

    /// Attaches a detached object at the root, keeping root order.
    fn attach_root(&mut self, handle: Self::Handle) -> bool;

    /// Re-sorts the children of a parent after order changes.
    fn sort_children(&mut self, parent: Self::Handle);
}

impl ModelTreeAdapter for ModelArena {
    type Handle = ModelKey;

    fn class_of(&self, handle: ModelKey) -> Option<ClassToken> {
        ModelArena::class_of(self, handle)
    }

    fn parent_of(&self, handle: ModelKey) -> Option<ModelKey> {
        self.parent(handle)
    }

    fn ancestors_of(&self, handle: ModelKey) -> Vec<ClassToken> {
        self.ancestor_tokens(handle)
    }

    fn set_order(&mut self, handle: ModelKey, order: f64) -> bool {
        ModelArena::set_order(self, handle, order).is_ok()
    }

    fn detach(&mut self, handle: ModelKey) -> bool {
        ModelArena::detach(self, handle).is_ok()
    }

    fn attach_child(&mut self, parent: ModelKey, child: ModelKey) -> bool {
        ModelArena::attach_child(self, parent, child).is_ok()
    }

    fn attach_root(&mut self, handle: ModelKey) -> bool {
        self.attach_root_ordered(handle).is_ok()
    }

    fn sort_children(&mut self, parent: ModelKey) {
        let _ = ModelArena::sort_children(self, parent);
    }
}

/// Applies registered moves to a batch of model objects.
pub struct MoveModelObjectHandler<'a, A: ModelTreeAdapter> {
    registry: &'a ExtensionRegistry,
    adapter: &'a mut A,
}

impl<'a, A: ModelTreeAdapter> MoveModelObjectHandler<'a, A> {
    /// Creates a handler over one registry and one tree.
    pub fn new(registry: &'a ExtensionRegistry, adapter: &'a mut A) -> Self {
        Self { registry, adapter }
    }

    /// Resolves and applies the move descriptor for every object in the
    /// batch, in batch order.
    ///
    /// A named target container is searched among the other objects of the
    /// same batch, by assignability to the container's innermost segment.
    /// Unresolvable containers do not stop the batch; they are reported
    /// together in a single error after all resolvable moves were applied.
    pub fn move_model_objects(&mut self, all: &[A::Handle]) -> Result<()> {
        let mut failures: Vec<String> = Vec::new();
        for &handle in all {
            let Some(class) = self.adapter.class_of(handle) else {
                continue;
            };
            let ancestors = self.adapter.ancestors_of(handle);
            let mut ancestors = ancestors.into_iter();
            let Some(descriptor) = self
                .registry
                .create_model_move_descriptor(class, Some(&mut ancestors))
            else {
                continue;
            };
            self.apply(handle, class, &descriptor, all, &mut failures);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExtensionError::UnresolvedMoveContainers {
                details: failures.join("; "),
            })
        }
    }

    fn apply(
        &mut self,
        handle: A::Handle,
        class: ClassToken,
        descriptor: &MoveDescriptor,
        all: &[A::Handle],
        failures: &mut Vec<String>,
    ) {
        let parent = self.adapter.parent_of(handle);
        let to_root = descriptor.is_move_to_root();

        // An order-only move, or a root move for an object already at the
        // root, reorders in place.
        if descriptor.new_container.is_none() || (to_root && parent.is_none()) {
            if let Some(order) = descriptor.new_order {
                self.adapter.set_order(handle, order);
                if let Some(parent) = parent {
                    self.adapter.sort_children(parent);
                }
                tracing::debug!(
                    target: targets::MOVE,
                    class = class.name(),
                    order,
                    "reordered in place"
                );
            }
            return;
        }

        if to_root {
            self.adapter.detach(handle);
            if let Some(order) = descriptor.new_order {
                self.adapter.set_order(handle, order);
            }
            self.adapter.attach_root(handle);
            tracing::debug!(target: targets::MOVE, class = class.name(), "moved to root");
            return;
        }

        // Named container: the first other object in the batch assignable
        // to the container's innermost segment.
        let Some(container) = descriptor.new_container.as_ref().map(|c| c.last_segment()) else {
            return;
        };
        let graph = self.registry.class_graph();
        let new_parent = all
            .iter()
            .copied()
            .filter(|&candidate| candidate != handle)
            .find(|&candidate| {
                self.adapter
                    .class_of(candidate)
                    .is_some_and(|c| graph.is_assignable(c, container))
            });
        let Some(new_parent) = new_parent else {
            failures.push(format!(
                "no container assignable to '{}' found for '{}'",
                container.name(),
                class.name()
            ));
            return;
        };
        self.adapter.detach(handle);
        if let Some(order) = descriptor.new_order {
            self.adapter.set_order(handle, order);
        }
        self.adapter.attach_child(new_parent, handle);
        self.adapter.sort_children(new_parent);
        tracing::debug!(
            target: targets::MOVE,
            class = class.name(),
            container = container.name(),
            "moved into container"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ConstructorRegistry;
    use std::any::Any;
    use std::sync::Arc;
    use trellis_core::meta::{ClassGraph, ClassInfo, ordered_token};
    use trellis_core::object::ModelObject;

    macro_rules! ordered_model {
        ($name:ident) => {
            struct $name {
                order: f64,
            }
            impl ModelObject for $name {
                fn class_token(&self) -> ClassToken {
                    ClassToken::of::<$name>()
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
        };
    }

    ordered_model!(RowGroup);
    ordered_model!(RowA);
    ordered_model!(RowB);

    fn registry() -> ExtensionRegistry {
        let graph = Arc::new(ClassGraph::new());
        graph.register_info(ClassInfo::new::<RowGroup>().implements_token(ordered_token()));
        graph.register_info(ClassInfo::new::<RowA>().implements_token(ordered_token()));
        graph.register_info(ClassInfo::new::<RowB>().implements_token(ordered_token()));
        ExtensionRegistry::new(graph, Arc::new(ConstructorRegistry::new()))
    }

    #[test]
    fn test_move_into_named_container() {
        let registry = registry();
        registry
            .register_move(
                ClassIdentifier::of::<RowB>(),
                Some(20.0),
                Some(ClassIdentifier::of::<RowGroup>()),
            )
            .unwrap();

        let mut arena = ModelArena::new();
        let group = arena.insert_root(Box::new(RowGroup { order: 10.0 }));
        let row_a = arena.insert_child(group, Box::new(RowA { order: 10.0 })).unwrap();
        let row_b = arena.insert_root(Box::new(RowB { order: 30.0 }));

        let all = arena.all_keys();
        MoveModelObjectHandler::new(&registry, &mut arena)
            .move_model_objects(&all)
            .unwrap();

        assert_eq!(arena.parent(row_b), Some(group));
        assert_eq!(arena.order_of(row_b), Some(20.0));
        // Sorted among its new siblings by order.
        assert_eq!(arena.children(group), &[row_a, row_b]);
    }

    #[test]
    fn test_move_to_root() {
        let registry = registry();
        registry
            .register_move(
                ClassIdentifier::of::<RowB>(),
                Some(5.0),
                Some(ClassIdentifier::from(move_to_root_token())),
            )
            .unwrap();

        let mut arena = ModelArena::new();
        let group = arena.insert_root(Box::new(RowGroup { order: 10.0 }));
        let row_b = arena.insert_child(group, Box::new(RowB { order: 30.0 })).unwrap();

        let all = arena.all_keys();
        MoveModelObjectHandler::new(&registry, &mut arena)
            .move_model_objects(&all)
            .unwrap();

        assert_eq!(arena.parent(row_b), None);
        assert_eq!(arena.roots(), &[row_b, group]);
    }

    #[test]
    fn test_order_only_move_resorts_siblings() {
        let registry = registry();
        registry
            .register_move(ClassIdentifier::of::<RowA>(), Some(99.0), None)
            .unwrap();

        let mut arena = ModelArena::new();
        let group = arena.insert_root(Box::new(RowGroup { order: 10.0 }));
        let row_a = arena.insert_child(group, Box::new(RowA { order: 10.0 })).unwrap();
        let row_b = arena.insert_child(group, Box::new(RowB { order: 20.0 })).unwrap();

        let all = arena.all_keys();
        MoveModelObjectHandler::new(&registry, &mut arena)
            .move_model_objects(&all)
            .unwrap();

        assert_eq!(arena.order_of(row_a), Some(99.0));
        assert_eq!(arena.children(group), &[row_b, row_a]);
    }

    #[test]
    fn test_unresolved_container_is_collected() {
        let registry = registry();
        registry
            .register_move(
                ClassIdentifier::of::<RowB>(),
                None,
                Some(ClassIdentifier::of::<RowGroup>()),
            )
            .unwrap();

        // No RowGroup in the batch.
        let mut arena = ModelArena::new();
        arena.insert_root(Box::new(RowB { order: 30.0 }));

        let all = arena.all_keys();
        let err = MoveModelObjectHandler::new(&registry, &mut arena)
            .move_model_objects(&all)
            .unwrap_err();
        assert!(matches!(err, ExtensionError::UnresolvedMoveContainers { .. }));
    }

    #[test]
    fn test_descriptor_fields_merge_independently() {
        let registry = registry();
        registry
            .register_move(ClassIdentifier::of::<RowB>(), Some(20.0), None)
            .unwrap();
        registry
            .register_move(
                ClassIdentifier::of::<RowB>(),
                None,
                Some(ClassIdentifier::of::<RowGroup>()),
            )
            .unwrap();

        let descriptor = registry
            .create_model_move_descriptor(ClassToken::of::<RowB>(), None)
            .unwrap();
        assert_eq!(descriptor.new_order, Some(20.0));
        assert_eq!(
            descriptor.new_container,
            Some(ClassIdentifier::of::<RowGroup>())
        );
        assert!(!descriptor.is_move_to_root());
    }
}
