//! The extension registry facade.
//!
//! One [`ExtensionRegistry`] owns the three registration maps (extensions,
//! contributions, moves), their derived scope indexes, and the per-thread
//! resolution context. Registrations take the write lock and rebuild the
//! affected scope wholesale; resolution clones the current scope snapshot
//! under the read lock and runs instantiation outside any lock.
//!
//! Owner detection, compatibility validation and recursive registration of
//! nested classes follow the class descriptors in the shared
//! [`ClassGraph`]. Authorization of contributions and moves is pluggable
//! via [`RegistrationValidator`]; a registration is accepted as soon as one
//! installed validator accepts it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use static_assertions::assert_impl_all;
use trellis_core::meta::{ClassGraph, ClassInfo, ClassToken, move_to_root_token};
use trellis_core::object::ModelObject;

use crate::context::{
    ExtensionContextBackup, ScopeFrame, run_with_context, with_context,
};
use crate::error::{ExtensionError, Result};
use crate::factory::{AnyExtension, CreationContext, InstanceFactory};
use crate::identifier::ClassIdentifier;
use crate::item::{ExtensionItem, MoveItem};
use crate::logging::targets;
use crate::move_handler::MoveDescriptor;
use crate::scope::Scope;

/// A list of extension instances pushed onto the extension stack together.
///
/// Pop symmetry is checked by `Arc` identity of the list.
pub type ExtensionList = Arc<Vec<Arc<dyn AnyExtension>>>;

/// Pluggable authorization for contribution and move registrations.
///
/// Validators are consulted in installation order; the first to accept
/// wins. A registration rejected by every validator fails.
pub trait RegistrationValidator: Send + Sync {
    /// Whether `contribution` may be contributed into `container`.
    fn is_valid_contribution(&self, contribution: ClassToken, container: ClassToken) -> bool;

    /// Whether `model` may be moved into `new_container`.
    fn is_valid_move(&self, model: ClassToken, new_container: ClassToken) -> bool;
}

/// Default validator: accepts what the class graph's capability markers
/// allow. Contributions require a contribution-holding container, moves an
/// ordered container.
pub struct GraphCapabilityValidator {
    graph: Arc<ClassGraph>,
}

impl GraphCapabilityValidator {
    /// Creates a validator consulting the given class graph.
    pub fn new(graph: Arc<ClassGraph>) -> Self {
        Self { graph }
    }
}

impl RegistrationValidator for GraphCapabilityValidator {
    fn is_valid_contribution(&self, _contribution: ClassToken, container: ClassToken) -> bool {
        self.graph.holds_contributions(container)
    }

    fn is_valid_move(&self, _model: ClassToken, new_container: ClassToken) -> bool {
        self.graph.is_ordered(new_container)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Extension,
    Contribution,
}

/// A validated registration awaiting commit. Planning is side-effect free
/// so a failure anywhere in a recursive registration leaves the registry
/// untouched.
struct PlannedItem {
    kind: ItemKind,
    owner: ClassIdentifier,
    target: ClassToken,
    declaring: Option<ClassToken>,
    order: Option<f64>,
}

/// The enclosing registration while recursing into nested classes.
struct DeclaringCtx {
    token: ClassToken,
    owner: ClassIdentifier,
}

struct RegistryInner {
    extensions: HashMap<ClassIdentifier, Vec<Arc<ExtensionItem>>>,
    contributions: HashMap<ClassIdentifier, Vec<Arc<ExtensionItem>>>,
    moves: HashMap<ClassIdentifier, Vec<Arc<MoveItem>>>,
    extension_scope: Arc<Scope<ExtensionItem>>,
    contribution_scope: Arc<Scope<ExtensionItem>>,
    move_scope: Arc<Scope<MoveItem>>,
}

static REGISTRY_IDS: AtomicU64 = AtomicU64::new(1);

/// Registry of extension, contribution and move registrations with scoped
/// resolution.
pub struct ExtensionRegistry {
    id: u64,
    graph: Arc<ClassGraph>,
    factory: Arc<dyn InstanceFactory>,
    validators: RwLock<Vec<Arc<dyn RegistrationValidator>>>,
    sequence: AtomicU64,
    inner: RwLock<RegistryInner>,
}

assert_impl_all!(ExtensionRegistry: Send, Sync);

impl ExtensionRegistry {
    /// Creates an empty registry over the given class graph and instance
    /// factory, with the [`GraphCapabilityValidator`] installed.
    pub fn new(graph: Arc<ClassGraph>, factory: Arc<dyn InstanceFactory>) -> Self {
        let validator = Arc::new(GraphCapabilityValidator::new(Arc::clone(&graph)));
        Self::with_validators(graph, factory, vec![validator])
    }

    /// Creates an empty registry with an explicit validator chain.
    pub fn with_validators(
        graph: Arc<ClassGraph>,
        factory: Arc<dyn InstanceFactory>,
        validators: Vec<Arc<dyn RegistrationValidator>>,
    ) -> Self {
        let empty_ext: HashMap<ClassIdentifier, Vec<Arc<ExtensionItem>>> = HashMap::new();
        let empty_moves: HashMap<ClassIdentifier, Vec<Arc<MoveItem>>> = HashMap::new();
        let inner = RegistryInner {
            extension_scope: Scope::new_global(&empty_ext, true, Arc::clone(&graph)),
            contribution_scope: Scope::new_global(&empty_ext, true, Arc::clone(&graph)),
            move_scope: Scope::new_global(&empty_moves, false, Arc::clone(&graph)),
            extensions: empty_ext,
            contributions: HashMap::new(),
            moves: empty_moves,
        };
        Self {
            id: REGISTRY_IDS.fetch_add(1, Ordering::Relaxed),
            graph,
            factory,
            validators: RwLock::new(validators),
            sequence: AtomicU64::new(1),
            inner: RwLock::new(inner),
        }
    }

    /// The class graph this registry resolves against.
    pub fn class_graph(&self) -> &Arc<ClassGraph> {
        &self.graph
    }

    /// Appends a validator to the authorization chain.
    pub fn add_validator(&self, validator: Arc<dyn RegistrationValidator>) {
        self.validators.write().push(validator);
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers an extension or contribution class, detecting its owner
    /// from the class descriptors.
    pub fn register(&self, target: ClassToken) -> Result<()> {
        self.register_with(target, None, None)
    }

    /// Registers an extension or contribution class with an explicit owner
    /// identifier and/or an explicit order for created instances.
    ///
    /// Nested classes declared by the target are registered recursively.
    /// The whole registration is atomic: a failure anywhere leaves the
    /// registry unchanged.
    pub fn register_with(
        &self,
        target: ClassToken,
        owner: Option<ClassIdentifier>,
        order: Option<f64>,
    ) -> Result<()> {
        let mut planned = Vec::new();
        self.plan_registration(target, owner, order, None, &mut planned)?;

        let mut inner = self.inner.write();
        let mut touched_extensions = false;
        let mut touched_contributions = false;
        for plan in planned {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            let item = Arc::new(ExtensionItem::new(
                plan.owner.clone(),
                plan.target,
                plan.declaring,
                plan.order,
                sequence,
            ));
            tracing::debug!(
                target: targets::REGISTRY,
                class = plan.target.name(),
                owner = %plan.owner,
                sequence,
                kind = match plan.kind {
                    ItemKind::Extension => "extension",
                    ItemKind::Contribution => "contribution",
                },
                "registered"
            );
            match plan.kind {
                ItemKind::Extension => {
                    inner.extensions.entry(plan.owner).or_default().push(item);
                    touched_extensions = true;
                }
                ItemKind::Contribution => {
                    inner.contributions.entry(plan.owner).or_default().push(item);
                    touched_contributions = true;
                }
            }
        }
        if touched_extensions {
            inner.extension_scope =
                Scope::new_global(&inner.extensions, true, Arc::clone(&self.graph));
        }
        if touched_contributions {
            inner.contribution_scope =
                Scope::new_global(&inner.contributions, true, Arc::clone(&self.graph));
        }
        Ok(())
    }

    /// Removes every registration of `target` and, recursively, of its
    /// declared nested classes. Returns true when anything was removed.
    pub fn deregister(&self, target: ClassToken) -> bool {
        let mut targets_to_remove = vec![target];
        let mut work = vec![target];
        while let Some(current) = work.pop() {
            if let Some(info) = self.graph.info(current) {
                for nested in info.nested {
                    if !targets_to_remove.contains(&nested) {
                        targets_to_remove.push(nested);
                        work.push(nested);
                    }
                }
            }
        }

        let mut inner = self.inner.write();
        let mut touched_extensions = false;
        let mut touched_contributions = false;
        for map_is_extensions in [true, false] {
            let map = if map_is_extensions {
                &mut inner.extensions
            } else {
                &mut inner.contributions
            };
            let mut removed = false;
            map.retain(|_, items| {
                let before = items.len();
                items.retain(|item| !targets_to_remove.contains(&item.target()));
                removed |= items.len() != before;
                !items.is_empty()
            });
            if map_is_extensions {
                touched_extensions = removed;
            } else {
                touched_contributions = removed;
            }
        }
        if touched_extensions {
            inner.extension_scope =
                Scope::new_global(&inner.extensions, true, Arc::clone(&self.graph));
        }
        if touched_contributions {
            inner.contribution_scope =
                Scope::new_global(&inner.contributions, true, Arc::clone(&self.graph));
        }
        if touched_extensions || touched_contributions {
            tracing::debug!(
                target: targets::REGISTRY,
                class = target.name(),
                "deregistered"
            );
        }
        touched_extensions || touched_contributions
    }

    /// Registers a relocation of an ordered model class.
    ///
    /// At least one of `new_order` and `new_container` must be given. The
    /// container must itself be an ordered type, different from the model
    /// type, and accepted by a validator; the root marker container skips
    /// validation.
    pub fn register_move(
        &self,
        model: ClassIdentifier,
        new_order: Option<f64>,
        new_container: Option<ClassIdentifier>,
    ) -> Result<()> {
        let model_leaf = model.last_segment();
        if !self.graph.is_ordered(model_leaf) {
            return Err(ExtensionError::NotOrdered {
                class_name: model_leaf.name(),
            });
        }
        if new_order.is_none() && new_container.is_none() {
            return Err(ExtensionError::EmptyMove {
                model: model_leaf.name(),
            });
        }
        if let Some(container) = &new_container {
            let container_leaf = container.last_segment();
            if container_leaf != move_to_root_token() {
                if !self.graph.is_ordered(container_leaf) {
                    return Err(ExtensionError::NotOrdered {
                        class_name: container_leaf.name(),
                    });
                }
                if container_leaf == model_leaf {
                    return Err(ExtensionError::SelfContainer {
                        model: model_leaf.name(),
                    });
                }
                if !self.any_validator(|v| v.is_valid_move(model_leaf, container_leaf)) {
                    return Err(ExtensionError::UnauthorizedMove {
                        model: model_leaf.name(),
                        container: container_leaf.name(),
                    });
                }
            }
        }

        let mut inner = self.inner.write();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let item = Arc::new(MoveItem::new(
            model.clone(),
            new_container,
            new_order,
            sequence,
        ));
        tracing::debug!(
            target: targets::REGISTRY,
            model = %model,
            sequence,
            "registered move"
        );
        inner.moves.entry(model).or_default().push(item);
        inner.move_scope = Scope::new_global(&inner.moves, false, Arc::clone(&self.graph));
        Ok(())
    }

    fn plan_registration(
        &self,
        target: ClassToken,
        explicit_owner: Option<ClassIdentifier>,
        explicit_order: Option<f64>,
        declaring: Option<&DeclaringCtx>,
        out: &mut Vec<PlannedItem>,
    ) -> Result<()> {
        let info = self
            .graph
            .info(target)
            .ok_or(ExtensionError::UnknownClass {
                class_name: target.name(),
            })?;
        let is_extension = self.graph.is_extension(target);
        let owner = self.detect_owner(&info, explicit_owner, declaring, is_extension)?;
        self.validate_registration(&info, &owner, explicit_order, is_extension)?;

        out.push(PlannedItem {
            kind: if is_extension {
                ItemKind::Extension
            } else {
                ItemKind::Contribution
            },
            owner: owner.clone(),
            target,
            declaring: declaring.map(|d| d.token),
            order: explicit_order.or(info.order),
        });

        // Extensions always carry their nested classes along; ordered
        // contribution carriers only pick up nested classes that declare
        // their own container marker.
        let recurse_all = is_extension;
        let recurse_marked = !is_extension && self.graph.is_ordered(target);
        if recurse_all || recurse_marked {
            let ctx = DeclaringCtx {
                token: target,
                owner,
            };
            for nested in &info.nested {
                let Some(nested_info) = self.graph.info(*nested) else {
                    return Err(ExtensionError::UnknownClass {
                        class_name: nested.name(),
                    });
                };
                if nested_info.is_abstract {
                    continue;
                }
                if recurse_marked && self.graph.extends_spec_in_chain(*nested).is_none() {
                    continue;
                }
                self.plan_registration(*nested, None, None, Some(&ctx), out)?;
            }
        }
        Ok(())
    }

    /// Owner detection, in decreasing precedence: explicit identifier,
    /// declared owner type parameter (prefixed with the enclosing owner
    /// path unless the class opts out), `extends` marker in the supertype
    /// chain, inherited enclosing owner path.
    fn detect_owner(
        &self,
        info: &ClassInfo,
        explicit: Option<ClassIdentifier>,
        declaring: Option<&DeclaringCtx>,
        is_extension: bool,
    ) -> Result<ClassIdentifier> {
        if let Some(owner) = explicit {
            return Ok(owner);
        }
        if is_extension && let Some(owner_param) = info.extension_owner {
            if let Some(ctx) = declaring
                && !info.local_owner_only
            {
                return Ok(ctx.owner.appended(owner_param));
            }
            return Ok(ClassIdentifier::from(owner_param));
        }
        if let Some(spec) = self.graph.extends_spec_in_chain(info.token) {
            if spec.path_to_container.len() > 1 {
                return Err(ExtensionError::DeepLinkTooLong {
                    target: info.token.name(),
                    got: spec.path_to_container.len(),
                });
            }
            let mut segments = spec.path_to_container;
            segments.push(spec.target);
            return Ok(ClassIdentifier::new(segments));
        }
        if let Some(ctx) = declaring {
            return Ok(ctx.owner.clone());
        }
        Err(ExtensionError::MissingOwner {
            target: info.token.name(),
        })
    }

    fn validate_registration(
        &self,
        info: &ClassInfo,
        owner: &ClassIdentifier,
        explicit_order: Option<f64>,
        is_extension: bool,
    ) -> Result<()> {
        let owner_leaf = owner.last_segment();
        if is_extension {
            match info.extension_owner {
                Some(declared) => {
                    if !self.graph.is_assignable(owner_leaf, declared) {
                        return Err(ExtensionError::IncompatibleOwner {
                            target: info.token.name(),
                            owner: owner_leaf.name(),
                            declared: declared.name(),
                        });
                    }
                }
                None => {
                    tracing::warn!(
                        target: targets::REGISTRY,
                        class = info.token.name(),
                        "owner type undeclared, skipping compatibility check"
                    );
                }
            }
        } else {
            if !self.graph.holds_contributions(owner_leaf) {
                return Err(ExtensionError::UnauthorizedContribution {
                    target: info.token.name(),
                    container: owner_leaf.name(),
                });
            }
            if !self.any_validator(|v| v.is_valid_contribution(info.token, owner_leaf)) {
                return Err(ExtensionError::UnauthorizedContribution {
                    target: info.token.name(),
                    container: owner_leaf.name(),
                });
            }
        }
        if explicit_order.or(info.order).is_some() && !self.graph.is_ordered(info.token) {
            tracing::warn!(
                target: targets::REGISTRY,
                class = info.token.name(),
                "declared order on a type that is not order-aware"
            );
        }
        Ok(())
    }

    fn any_validator(&self, accept: impl Fn(&dyn RegistrationValidator) -> bool) -> bool {
        self.validators.read().iter().any(|v| accept(v.as_ref()))
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Creates the extension instances registered for the given owner,
    /// resolved against the current thread's scope, in registration order.
    pub fn create_extensions_for(
        &self,
        owner: &dyn ModelObject,
    ) -> Result<Vec<Arc<dyn AnyExtension>>> {
        let (scope, _) = self.current_scopes();
        let items = scope.resolve(owner.class_token(), None);
        self.instantiate(items, owner)
    }

    /// Creates the contribution instances registered for the given
    /// container, optionally filtered to contributions assignable to
    /// `filter`.
    pub fn create_contributions_for(
        &self,
        container: &dyn ModelObject,
        filter: Option<ClassToken>,
    ) -> Result<Vec<Arc<dyn AnyExtension>>> {
        let (_, scope) = self.current_scopes();
        let mut items = scope.resolve(container.class_token(), None);
        if let Some(filter) = filter {
            items.retain(|item| self.graph.is_assignable(item.target(), filter));
        }
        self.instantiate(items, container)
    }

    /// Resolves the merged move descriptor for a model class, or `None`
    /// when no move registration applies.
    ///
    /// The ancestor iterator supplies the containment chain innermost
    /// first; it is consulted lazily, one ancestor per unmatched segment.
    /// Later registrations override earlier ones field by field.
    pub fn create_model_move_descriptor(
        &self,
        model: ClassToken,
        ancestors: Option<&mut dyn Iterator<Item = ClassToken>>,
    ) -> Option<MoveDescriptor> {
        let scope = {
            let inner = self.inner.read();
            Arc::clone(&inner.move_scope)
        };
        let items = scope.resolve(model, ancestors);
        if items.is_empty() {
            return None;
        }
        let mut descriptor = MoveDescriptor {
            new_container: None,
            new_order: None,
        };
        for item in items {
            if let Some(container) = item.new_container() {
                descriptor.new_container = Some(container.clone());
            }
            if let Some(order) = item.new_order() {
                descriptor.new_order = Some(order);
            }
        }
        Some(descriptor)
    }

    /// Instantiation runs outside the registry lock; the factory may call
    /// back into resolution.
    fn instantiate(
        &self,
        items: Vec<Arc<ExtensionItem>>,
        owner: &dyn ModelObject,
    ) -> Result<Vec<Arc<dyn AnyExtension>>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let declaring_instance = match item.declaring() {
                Some(declaring) => Some(self.find_enclosing_instance(declaring).ok_or(
                    ExtensionError::EnclosingInstanceNotFound {
                        target: item.target().name(),
                        declaring: declaring.name(),
                    },
                )?),
                None => None,
            };
            let instance = self.factory.create(CreationContext {
                target: item.target(),
                owner,
                declaring_instance: declaring_instance.as_ref(),
                order: item.new_model_order(),
            })?;
            out.push(instance);
        }
        Ok(out)
    }

    /// Searches the extension stack, innermost frame first, for a live
    /// instance assignable to the declaring class.
    fn find_enclosing_instance(&self, declaring: ClassToken) -> Option<Arc<dyn AnyExtension>> {
        with_context(self.id, |ctx| {
            for frame in ctx.extension_stack.iter().rev() {
                for instance in frame.iter() {
                    if self.graph.is_assignable(instance.class_token(), declaring) {
                        return Some(Arc::clone(instance));
                    }
                }
            }
            None
        })
    }

    /// The scopes resolution currently runs against: the top of the
    /// thread's scope stack, or the global scopes.
    fn current_scopes(&self) -> (Arc<Scope<ExtensionItem>>, Arc<Scope<ExtensionItem>>) {
        let frame = with_context(self.id, |ctx| ctx.scope_stack.last().cloned());
        match frame {
            Some(frame) => (frame.extensions, frame.contributions),
            None => {
                let inner = self.inner.read();
                (
                    Arc::clone(&inner.extension_scope),
                    Arc::clone(&inner.contribution_scope),
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // Thread-local context
    // ------------------------------------------------------------------

    /// Narrows the current thread's resolution scope for an owner type
    /// about to have its parts created. Must be balanced by [`pop_scope`].
    ///
    /// A push always produces a frame, even when nothing narrows, so that
    /// push and pop counts stay symmetric.
    ///
    /// [`pop_scope`]: Self::pop_scope
    pub fn push_scope(&self, owner: ClassToken) {
        let (extensions, contributions) = self.current_scopes();
        let frame = ScopeFrame {
            extensions: extensions.create_sub_scope(owner).unwrap_or(extensions),
            contributions: contributions
                .create_sub_scope(owner)
                .unwrap_or(contributions),
        };
        with_context(self.id, |ctx| ctx.scope_stack.push(frame));
        tracing::trace!(target: targets::CONTEXT, owner = owner.name(), "pushed scope");
    }

    /// Pops the innermost scope frame.
    ///
    /// # Panics
    ///
    /// Panics when the scope stack is empty; push and pop must be balanced.
    pub fn pop_scope(&self) {
        with_context(self.id, |ctx| {
            assert!(
                ctx.scope_stack.pop().is_some(),
                "pop_scope on an empty scope stack; push/pop must be balanced"
            );
        });
        tracing::trace!(target: targets::CONTEXT, "popped scope");
    }

    /// Pushes a list of live extension instances for enclosing-instance
    /// resolution of nested, declaring-class-scoped extensions.
    pub fn push_extensions(&self, extensions: ExtensionList) {
        with_context(self.id, |ctx| ctx.extension_stack.push(extensions));
    }

    /// Pops a previously pushed extension list.
    ///
    /// # Panics
    ///
    /// Panics when the stack is empty or `extensions` is not the list on
    /// top of it.
    pub fn pop_extensions(&self, extensions: &ExtensionList) {
        with_context(self.id, |ctx| match ctx.extension_stack.pop() {
            Some(top) if Arc::ptr_eq(&top, extensions) => {}
            Some(_) => panic!("pop_extensions with a list that is not on top of the stack"),
            None => panic!("pop_extensions on an empty extension stack"),
        });
    }

    /// Captures a copy of the current thread's resolution context for
    /// replay on another execution.
    pub fn backup_extension_context(&self) -> ExtensionContextBackup {
        let context = with_context(self.id, |ctx| ctx.clone());
        ExtensionContextBackup {
            registry_id: self.id,
            context,
        }
    }

    /// Runs `f` under a previously captured context, restoring the calling
    /// thread's own context afterward, also on unwind.
    pub fn run_in_context<R>(&self, backup: &ExtensionContextBackup, f: impl FnOnce() -> R) -> R {
        run_with_context(backup, f)
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ExtensionRegistry")
            .field("id", &self.id)
            .field("extensions", &inner.extensions.values().flatten().count())
            .field("contributions", &inner.contributions.values().flatten().count())
            .field("moves", &inner.moves.values().flatten().count())
            .finish()
    }
}
