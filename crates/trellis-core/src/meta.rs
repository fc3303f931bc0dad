//! Class metadata graph for Trellis model objects.
//!
//! Model classes are identified at runtime by a [`ClassToken`] (a `TypeId`
//! with a diagnostic name). Each class contributes a [`ClassInfo`] descriptor
//! to the [`ClassGraph`]: an optional supertype edge, any number of trait
//! edges, and the declarative metadata consumed by the extension registry
//! (declared owner type parameter, `extends` marker, nested classes,
//! declared order).
//!
//! Assignability between two classes is the transitive closure over these
//! declared edges. Closures are memoized per queried class and the memo table
//! is invalidated whenever a descriptor is (re)registered, which is rare
//! since descriptors are normally declared once at start-up.
//!
//! # Well-Known Markers
//!
//! Every graph is pre-seeded with five marker classes:
//!
//! - [`AnyModelObject`]: the universal root; every class is assignable to it
//! - [`OrderedObject`]: position-aware classes exposing an order field
//! - [`ContributionHolder`]: classes that accept structural contributions
//! - [`ExtensionObject`]: behavior-modifying extension classes
//! - [`MoveToRoot`]: the reserved container marker meaning "move to the
//!   root collection" (declared ordered)
//!
//! # Example
//!
//! ```
//! use trellis_core::meta::{ClassGraph, ClassInfo, ClassToken, ordered_token};
//!
//! struct TableColumn;
//! struct SmartColumn;
//!
//! let graph = ClassGraph::new();
//! graph.register_info(ClassInfo::new::<TableColumn>().implements_token(ordered_token()));
//! graph.register_info(ClassInfo::new::<SmartColumn>().extends_class::<TableColumn>());
//!
//! assert!(graph.is_ordered(ClassToken::of::<SmartColumn>()));
//! ```

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::logging::targets;

/// Runtime tag for a model class.
///
/// Equality and hashing use the underlying `TypeId` only; the name is carried
/// for diagnostics.
#[derive(Clone, Copy)]
pub struct ClassToken {
    id: TypeId,
    name: &'static str,
}

impl ClassToken {
    /// Returns the token for a Rust type.
    ///
    /// Any `'static` type can serve as a class in the graph, including
    /// never-instantiated marker types.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the diagnostic name of the class (the Rust type path).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the short name (last path segment) for display purposes.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for ClassToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClassToken {}

impl std::hash::Hash for ClassToken {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ClassToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassToken").field(&self.short_name()).finish()
    }
}

impl fmt::Display for ClassToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// The universal root marker. Every class is assignable to it.
pub struct AnyModelObject;

/// Marker for position-aware classes (numeric order field).
pub struct OrderedObject;

/// Marker for classes that accept structural contributions.
pub struct ContributionHolder;

/// Reserved container marker: "move this object to the root collection".
///
/// Declared ordered in every graph so that move validation treats a root
/// move like any other ordered-container move.
pub struct MoveToRoot;

/// Marker for extension classes (behavior-modifying units bound to an owner).
pub struct ExtensionObject;

/// Token for [`AnyModelObject`].
#[inline]
pub fn root_token() -> ClassToken {
    ClassToken::of::<AnyModelObject>()
}

/// Token for [`OrderedObject`].
#[inline]
pub fn ordered_token() -> ClassToken {
    ClassToken::of::<OrderedObject>()
}

/// Token for [`ContributionHolder`].
#[inline]
pub fn contribution_holder_token() -> ClassToken {
    ClassToken::of::<ContributionHolder>()
}

/// Token for [`MoveToRoot`].
#[inline]
pub fn move_to_root_token() -> ClassToken {
    ClassToken::of::<MoveToRoot>()
}

/// Token for [`ExtensionObject`].
#[inline]
pub fn extension_token() -> ClassToken {
    ClassToken::of::<ExtensionObject>()
}

/// Declarative `extends` marker: attaches a class to a container type,
/// optionally anchored to a path-to-container segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendsSpec {
    /// The container type this class extends.
    pub target: ClassToken,
    /// Optional containment path the target must be reached through.
    ///
    /// The extension registry accepts at most one segment here.
    pub path_to_container: Vec<ClassToken>,
}

/// Descriptor for one model class: its edges in the graph plus the
/// declarative metadata consumed by the extension registry.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// The class this descriptor describes.
    pub token: ClassToken,
    /// Declared supertype edge, if any.
    pub supertype: Option<ClassToken>,
    /// Declared trait (interface-like) edges.
    pub traits: Vec<ClassToken>,
    /// True for abstract classes; abstract nested classes are skipped during
    /// recursive registration.
    pub is_abstract: bool,
    /// Declared owner type parameter (extension classes only).
    pub extension_owner: Option<ClassToken>,
    /// Opt-out marker: do not combine with the enclosing extension's owner
    /// path during registration.
    pub local_owner_only: bool,
    /// Declarative `extends` marker, if present.
    pub extends: Option<ExtendsSpec>,
    /// Declared nested classes, registered recursively with this class as
    /// their declaring class.
    pub nested: Vec<ClassToken>,
    /// Declared order, applied to created instances of ordered classes.
    pub order: Option<f64>,
}

impl ClassInfo {
    /// Creates a descriptor for `T` with no edges or metadata.
    pub fn new<T: 'static>() -> Self {
        Self::for_token(ClassToken::of::<T>())
    }

    /// Creates a descriptor for an already-obtained token.
    pub fn for_token(token: ClassToken) -> Self {
        Self {
            token,
            supertype: None,
            traits: Vec::new(),
            is_abstract: false,
            extension_owner: None,
            local_owner_only: false,
            extends: None,
            nested: Vec::new(),
            order: None,
        }
    }

    /// Declares the supertype edge.
    pub fn extends_class<S: 'static>(mut self) -> Self {
        self.supertype = Some(ClassToken::of::<S>());
        self
    }

    /// Declares a trait edge to `S`.
    pub fn implements<S: 'static>(self) -> Self {
        self.implements_token(ClassToken::of::<S>())
    }

    /// Declares a trait edge to an already-obtained token.
    pub fn implements_token(mut self, token: ClassToken) -> Self {
        self.traits.push(token);
        self
    }

    /// Marks the class abstract.
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declares the class an extension of owner type `O`.
    ///
    /// Adds the extension trait edge and records the owner type parameter.
    pub fn extension_of<O: 'static>(mut self) -> Self {
        self.extension_owner = Some(ClassToken::of::<O>());
        self.traits.push(extension_token());
        self
    }

    /// Declares the class an extension whose owner type parameter could not
    /// be determined.
    ///
    /// The registry accepts such classes with an explicit owner identifier
    /// and logs a warning instead of failing compatibility validation.
    pub fn extension_with_unknown_owner(mut self) -> Self {
        self.traits.push(extension_token());
        self
    }

    /// Opts out of deep-linking through the enclosing extension's owner path.
    pub fn local_owner_only(mut self) -> Self {
        self.local_owner_only = true;
        self
    }

    /// Declares an `extends` marker pointing at container type `C`.
    pub fn extends_marker<C: 'static>(mut self) -> Self {
        self.extends = Some(ExtendsSpec {
            target: ClassToken::of::<C>(),
            path_to_container: Vec::new(),
        });
        self
    }

    /// Declares an `extends` marker with an explicit path-to-container.
    pub fn extends_marker_via<C: 'static>(mut self, path: Vec<ClassToken>) -> Self {
        self.extends = Some(ExtendsSpec {
            target: ClassToken::of::<C>(),
            path_to_container: path,
        });
        self
    }

    /// Declares a nested class, registered recursively with this class as
    /// its declaring class.
    pub fn with_nested<N: 'static>(mut self) -> Self {
        self.nested.push(ClassToken::of::<N>());
        self
    }

    /// Declares an explicit order for created instances.
    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }
}

/// Convenience trait for types that can describe themselves to the graph.
///
/// Implementing this is optional; descriptors can always be registered
/// directly via [`ClassGraph::register_info`].
pub trait ModelClass: 'static {
    /// Returns the descriptor for this class.
    fn class_info() -> ClassInfo;
}

struct GraphInner {
    classes: HashMap<ClassToken, ClassInfo>,
    // Memoized assignability closures, cleared on every registration.
    closures: HashMap<ClassToken, Arc<HashSet<ClassToken>>>,
}

/// The class metadata graph.
///
/// Thread-safe; closure lookups take a read lock on the memo table and only
/// upgrade to a write lock on a memo miss. Registration invalidates all
/// memoized closures.
pub struct ClassGraph {
    inner: RwLock<GraphInner>,
}

impl Default for ClassGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassGraph {
    /// Creates a graph pre-seeded with the well-known marker classes.
    pub fn new() -> Self {
        let graph = Self {
            inner: RwLock::new(GraphInner {
                classes: HashMap::new(),
                closures: HashMap::new(),
            }),
        };
        graph.register_info(ClassInfo::new::<AnyModelObject>());
        graph.register_info(ClassInfo::new::<OrderedObject>());
        graph.register_info(ClassInfo::new::<ContributionHolder>());
        graph.register_info(ClassInfo::new::<ExtensionObject>());
        graph.register_info(ClassInfo::new::<MoveToRoot>().implements_token(ordered_token()));
        graph
    }

    /// Registers `T` via its [`ModelClass`] descriptor.
    pub fn register<T: ModelClass>(&self) {
        self.register_info(T::class_info());
    }

    /// Registers a descriptor, replacing any previous descriptor for the
    /// same class. Invalidates all memoized closures.
    pub fn register_info(&self, info: ClassInfo) {
        let mut inner = self.inner.write();
        tracing::trace!(target: targets::META, class = info.token.name(), "registered class descriptor");
        inner.classes.insert(info.token, info);
        inner.closures.clear();
    }

    /// Returns the descriptor for a class, if registered.
    pub fn info(&self, token: ClassToken) -> Option<ClassInfo> {
        self.inner.read().classes.get(&token).cloned()
    }

    /// Returns true if the class has a registered descriptor.
    pub fn contains(&self, token: ClassToken) -> bool {
        self.inner.read().classes.contains_key(&token)
    }

    /// Returns the full assignability closure of a class: the class itself,
    /// every declared supertype and trait transitively, and the universal
    /// root.
    ///
    /// Classes without a descriptor get the minimal closure (self + root).
    pub fn closure(&self, token: ClassToken) -> Arc<HashSet<ClassToken>> {
        if let Some(closure) = self.inner.read().closures.get(&token) {
            return Arc::clone(closure);
        }
        let mut inner = self.inner.write();
        // Re-check: another thread may have memoized it between locks.
        if let Some(closure) = inner.closures.get(&token) {
            return Arc::clone(closure);
        }
        let closure = Arc::new(compute_closure(&inner.classes, token));
        inner.closures.insert(token, Arc::clone(&closure));
        closure
    }

    /// Returns true if `sub` is assignable to `sup` through declared edges.
    pub fn is_assignable(&self, sub: ClassToken, sup: ClassToken) -> bool {
        if sub == sup || sup == root_token() {
            return true;
        }
        self.closure(sub).contains(&sup)
    }

    /// Returns true if the class is position-aware.
    pub fn is_ordered(&self, token: ClassToken) -> bool {
        self.is_assignable(token, ordered_token())
    }

    /// Returns true if the class accepts structural contributions.
    pub fn holds_contributions(&self, token: ClassToken) -> bool {
        self.is_assignable(token, contribution_holder_token())
    }

    /// Returns true if the class is an extension.
    pub fn is_extension(&self, token: ClassToken) -> bool {
        self.is_assignable(token, extension_token())
    }

    /// Finds the first `extends` marker on the class or its supertype chain.
    pub fn extends_spec_in_chain(&self, token: ClassToken) -> Option<ExtendsSpec> {
        let inner = self.inner.read();
        let mut current = Some(token);
        let mut visited = HashSet::new();
        while let Some(t) = current {
            if !visited.insert(t) {
                break;
            }
            let Some(info) = inner.classes.get(&t) else { break };
            if let Some(spec) = &info.extends {
                return Some(spec.clone());
            }
            current = info.supertype;
        }
        None
    }
}

/// Iterative closure computation over declared edges.
///
/// Exploration terminates because the visited set is bounded by the finite
/// set of declared classes; unknown edge targets are treated as leaves.
fn compute_closure(
    classes: &HashMap<ClassToken, ClassInfo>,
    start: ClassToken,
) -> HashSet<ClassToken> {
    let mut closure = HashSet::new();
    let mut work = vec![start];
    while let Some(token) = work.pop() {
        if !closure.insert(token) {
            continue;
        }
        if let Some(info) = classes.get(&token) {
            if let Some(sup) = info.supertype {
                work.push(sup);
            }
            work.extend(info.traits.iter().copied());
        }
    }
    closure.insert(root_token());
    closure
}

static_assertions::assert_impl_all!(ClassGraph: Send, Sync);
static_assertions::assert_impl_all!(ClassToken: Send, Sync, Copy);

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    struct IfaceA;
    struct IfaceB;
    struct Mid;
    struct Leaf;

    fn diamond_graph() -> ClassGraph {
        let graph = ClassGraph::new();
        graph.register_info(ClassInfo::new::<Base>());
        graph.register_info(ClassInfo::new::<IfaceA>());
        graph.register_info(ClassInfo::new::<IfaceB>().implements::<IfaceA>());
        graph.register_info(
            ClassInfo::new::<Mid>()
                .extends_class::<Base>()
                .implements::<IfaceB>(),
        );
        graph.register_info(ClassInfo::new::<Leaf>().extends_class::<Mid>());
        graph
    }

    #[test]
    fn test_closure_includes_transitive_interfaces() {
        let graph = diamond_graph();
        let closure = graph.closure(ClassToken::of::<Leaf>());
        assert!(closure.contains(&ClassToken::of::<Leaf>()));
        assert!(closure.contains(&ClassToken::of::<Mid>()));
        assert!(closure.contains(&ClassToken::of::<Base>()));
        assert!(closure.contains(&ClassToken::of::<IfaceB>()));
        assert!(closure.contains(&ClassToken::of::<IfaceA>()));
        assert!(closure.contains(&root_token()));
    }

    #[test]
    fn test_assignability() {
        let graph = diamond_graph();
        assert!(graph.is_assignable(ClassToken::of::<Leaf>(), ClassToken::of::<IfaceA>()));
        assert!(graph.is_assignable(ClassToken::of::<Leaf>(), root_token()));
        assert!(!graph.is_assignable(ClassToken::of::<Base>(), ClassToken::of::<Leaf>()));
        assert!(!graph.is_assignable(ClassToken::of::<IfaceA>(), ClassToken::of::<IfaceB>()));
    }

    #[test]
    fn test_unregistered_class_has_minimal_closure() {
        struct Unknown;
        let graph = ClassGraph::new();
        let closure = graph.closure(ClassToken::of::<Unknown>());
        assert_eq!(closure.len(), 2);
        assert!(closure.contains(&ClassToken::of::<Unknown>()));
        assert!(closure.contains(&root_token()));
    }

    #[test]
    fn test_memo_invalidated_on_registration() {
        struct Extra;
        let graph = diamond_graph();
        assert!(!graph.is_assignable(ClassToken::of::<Leaf>(), ClassToken::of::<Extra>()));

        // Re-register Mid with an additional edge; the old memoized closure
        // must not survive.
        graph.register_info(
            ClassInfo::new::<Mid>()
                .extends_class::<Base>()
                .implements::<IfaceB>()
                .implements::<Extra>(),
        );
        assert!(graph.is_assignable(ClassToken::of::<Leaf>(), ClassToken::of::<Extra>()));
    }

    #[test]
    fn test_cyclic_edges_terminate() {
        struct CycA;
        struct CycB;
        let graph = ClassGraph::new();
        graph.register_info(ClassInfo::new::<CycA>().extends_class::<CycB>());
        graph.register_info(ClassInfo::new::<CycB>().extends_class::<CycA>());
        let closure = graph.closure(ClassToken::of::<CycA>());
        assert!(closure.contains(&ClassToken::of::<CycB>()));
    }

    #[test]
    fn test_move_to_root_is_ordered() {
        let graph = ClassGraph::new();
        assert!(graph.is_ordered(move_to_root_token()));
    }

    #[test]
    fn test_extends_spec_in_chain() {
        struct Container;
        struct ParentWithMarker;
        struct Child;
        let graph = ClassGraph::new();
        graph.register_info(ClassInfo::new::<Container>());
        graph.register_info(ClassInfo::new::<ParentWithMarker>().extends_marker::<Container>());
        graph.register_info(ClassInfo::new::<Child>().extends_class::<ParentWithMarker>());

        let spec = graph.extends_spec_in_chain(ClassToken::of::<Child>()).unwrap();
        assert_eq!(spec.target, ClassToken::of::<Container>());
        assert!(graph.extends_spec_in_chain(ClassToken::of::<Container>()).is_none());
    }

    #[test]
    fn test_token_display_uses_short_name() {
        let token = ClassToken::of::<Base>();
        assert_eq!(token.to_string(), "Base");
    }
}
