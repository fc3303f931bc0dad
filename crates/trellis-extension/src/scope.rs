//! The scope index: class-identifier matching over type closures.
//!
//! A [`Scope`] is an immutable snapshot indexing every registered identifier
//! by its current segment. It is rebuilt wholesale whenever the registration
//! maps change and never mutated in place, so a reader that captured a scope
//! reference always sees a fully consistent snapshot.
//!
//! Two traversal strategies operate over the same identifiers:
//!
//! - **Top-down sub-scoping** ([`Scope::create_sub_scope`]): used while
//!   descending into nested owners during model construction. Each call
//!   narrows the first unconsumed segment of every identifier whose current
//!   segment matches the owner type, layering a child scope over its parent.
//! - **Bottom-up filtering** ([`Scope::resolve`] with an ancestor iterator):
//!   used when resolving a single leaf object whose ancestors are supplied
//!   after the fact. Walks each identifier from its last segment toward the
//!   first, consuming one ancestor per step.
//!
//! Matching is by full supertype closure: a segment matches a concrete type
//! if the type, its supertype chain, or any transitively implemented trait
//! equals the segment.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use trellis_core::meta::{ClassGraph, ClassToken};

use crate::identifier::ClassIdentifier;
use crate::item::RegistryItem;

/// A cursor into one class identifier at a given traversal depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeItem {
    identifier: ClassIdentifier,
    index: usize,
    top_down: bool,
}

impl ScopeItem {
    /// Creates a cursor at the identifier's starting segment: the first
    /// (outermost) segment top-down, the last (innermost) bottom-up.
    pub fn new(identifier: ClassIdentifier, top_down: bool) -> Self {
        let index = if top_down { 0 } else { identifier.size() - 1 };
        Self {
            identifier,
            index,
            top_down,
        }
    }

    /// The identifier this cursor traverses.
    pub fn identifier(&self) -> &ClassIdentifier {
        &self.identifier
    }

    /// The segment the cursor currently points at.
    pub fn current_segment(&self) -> ClassToken {
        self.identifier.classes()[self.index]
    }

    /// The traversal direction.
    pub fn is_top_down(&self) -> bool {
        self.top_down
    }

    /// True when the cursor has reached the terminal segment of its
    /// traversal direction.
    pub fn is_last_segment(&self) -> bool {
        if self.top_down {
            self.index == self.identifier.size() - 1
        } else {
            self.index == 0
        }
    }

    /// The segment that must match the next ancestor during bottom-up
    /// filtering.
    ///
    /// Only meaningful for bottom-up cursors that are not at their terminal
    /// segment.
    pub(crate) fn next_outward_segment(&self) -> ClassToken {
        debug_assert!(!self.top_down && !self.is_last_segment());
        self.identifier.classes()[self.index - 1]
    }

    /// Returns the cursor advanced one step in its traversal direction.
    pub(crate) fn advance(&self) -> Self {
        debug_assert!(!self.is_last_segment(), "advance past terminal segment");
        let index = if self.top_down { self.index + 1 } else { self.index - 1 };
        Self {
            identifier: self.identifier.clone(),
            index,
            top_down: self.top_down,
        }
    }
}

/// An immutable, layered index from class token to the scope items whose
/// current segment is that token.
///
/// Sub-scopes layer over (not replace) their parent; lookups consult the
/// whole chain of ancestor scopes. The registry-item map is shared across
/// the chain.
pub struct Scope<T: RegistryItem> {
    graph: Arc<ClassGraph>,
    top_down: bool,
    scope_items_by_type: HashMap<ClassToken, Vec<ScopeItem>>,
    registry_items: Arc<HashMap<ClassIdentifier, Vec<Arc<T>>>>,
    parent: Option<Arc<Scope<T>>>,
}

impl<T: RegistryItem> Scope<T> {
    /// Builds a global scope from a full registration map.
    pub fn new_global(
        items: &HashMap<ClassIdentifier, Vec<Arc<T>>>,
        top_down: bool,
        graph: Arc<ClassGraph>,
    ) -> Arc<Self> {
        let mut by_type: HashMap<ClassToken, Vec<ScopeItem>> = HashMap::new();
        for identifier in items.keys() {
            let item = ScopeItem::new(identifier.clone(), top_down);
            by_type.entry(item.current_segment()).or_default().push(item);
        }
        Arc::new(Self {
            graph,
            top_down,
            scope_items_by_type: by_type,
            registry_items: Arc::new(items.clone()),
            parent: None,
        })
    }

    /// Narrows the scope for a concrete owner type.
    ///
    /// Every identifier whose current segment matches the owner type (by
    /// full supertype closure) and whose cursor has not reached its last
    /// segment advances one step into the child scope. Returns `None` when
    /// nothing narrows; the caller must reuse this scope unnarrowed so that
    /// identifiers that have not started matching yet are preserved.
    pub fn create_sub_scope(self: &Arc<Self>, owner: ClassToken) -> Option<Arc<Self>> {
        let advanced: Vec<ScopeItem> = self
            .collect_scope_items(owner)
            .into_iter()
            .filter(|item| !item.is_last_segment())
            .map(|item| item.advance())
            .collect();
        if advanced.is_empty() {
            return None;
        }
        let mut by_type: HashMap<ClassToken, Vec<ScopeItem>> = HashMap::new();
        for item in advanced {
            by_type.entry(item.current_segment()).or_default().push(item);
        }
        Some(Arc::new(Self {
            graph: Arc::clone(&self.graph),
            top_down: self.top_down,
            scope_items_by_type: by_type,
            registry_items: Arc::clone(&self.registry_items),
            parent: Some(Arc::clone(self)),
        }))
    }

    /// Resolves every registry item whose identifier is fully consumed for
    /// the given leaf type.
    ///
    /// For bottom-up scopes an optional ancestor iterator supplies the
    /// containment chain, innermost first; one ancestor is consumed per
    /// step. An ancestor that does not match an identifier's required
    /// segment leaves that identifier pending for the next ancestor.
    ///
    /// The result is ordered by ascending registration sequence number.
    pub fn resolve(
        &self,
        leaf: ClassToken,
        mut ancestors: Option<&mut dyn Iterator<Item = ClassToken>>,
    ) -> Vec<Arc<T>> {
        let mut consumed: HashSet<ClassIdentifier> = HashSet::new();
        let mut pending: Vec<ScopeItem> = Vec::new();

        for item in self.collect_scope_items(leaf) {
            if item.is_last_segment() {
                consumed.insert(item.identifier().clone());
            } else if !item.is_top_down() {
                pending.push(item);
            }
            // Top-down items not at their last segment require narrowing via
            // create_sub_scope before they can resolve.
        }

        if let Some(iter) = ancestors.as_deref_mut() {
            for ancestor in iter {
                if pending.is_empty() {
                    break;
                }
                let closure = self.graph.closure(ancestor);
                let mut next = Vec::with_capacity(pending.len());
                for item in pending {
                    if closure.contains(&item.next_outward_segment()) {
                        let advanced = item.advance();
                        if advanced.is_last_segment() {
                            consumed.insert(advanced.identifier().clone());
                        } else {
                            next.push(advanced);
                        }
                    } else {
                        next.push(item);
                    }
                }
                pending = next;
            }
        }

        let mut result: Vec<Arc<T>> = consumed
            .iter()
            .filter_map(|identifier| self.registry_items.get(identifier))
            .flatten()
            .cloned()
            .collect();
        result.sort_by_key(|item| item.sequence());
        result.dedup_by_key(|item| item.sequence());
        result
    }

    /// Collects the scope items matching a concrete type, consulting the
    /// whole chain of ancestor scopes and deduplicating.
    fn collect_scope_items(&self, ty: ClassToken) -> Vec<ScopeItem> {
        let closure = self.graph.closure(ty);
        let mut seen: HashSet<ScopeItem> = HashSet::new();
        let mut out = Vec::new();
        let mut scope = Some(self);
        while let Some(s) = scope {
            for token in closure.iter() {
                if let Some(items) = s.scope_items_by_type.get(token) {
                    for item in items {
                        if seen.insert(item.clone()) {
                            out.push(item.clone());
                        }
                    }
                }
            }
            scope = s.parent.as_deref();
        }
        out
    }
}
