//! Thread-local resolution context: the scope stack and extension stack.
//!
//! Model construction pushes a scope narrowing before creating an owner's
//! nested parts and pops it afterward; the extension stack holds the
//! currently-active extension instances so an inner, declaring-class-scoped
//! extension can find its enclosing instance. Both stacks are bounded by one
//! construction call tree and are never shared between threads.
//!
//! Storage is a thread-local map keyed by registry id, so two registries
//! used on the same thread cannot observe each other's context. The
//! [`ExtensionContextBackup`] capture/replay mechanism transfers a copy of
//! the stack contents to another execution and restores the prior context
//! when the replayed work completes, even on unwind.
//!
//! Unbalanced push/pop is a caller bug and panics; see the registry's
//! `pop_scope`/`pop_extensions`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::factory::AnyExtension;
use crate::item::ExtensionItem;
use crate::scope::Scope;

/// One entry of the scope stack: the narrowed scopes of both kinds.
pub(crate) struct ScopeFrame {
    pub(crate) extensions: Arc<Scope<ExtensionItem>>,
    pub(crate) contributions: Arc<Scope<ExtensionItem>>,
}

impl Clone for ScopeFrame {
    fn clone(&self) -> Self {
        Self {
            extensions: Arc::clone(&self.extensions),
            contributions: Arc::clone(&self.contributions),
        }
    }
}

/// One entry of the extension stack: the list of instances pushed together.
///
/// Push/pop symmetry is checked by `Arc` identity of this list.
pub(crate) type ExtensionFrame = Arc<Vec<Arc<dyn AnyExtension>>>;

/// The per-thread, per-registry resolution context.
#[derive(Default, Clone)]
pub(crate) struct ExtensionContext {
    pub(crate) scope_stack: Vec<ScopeFrame>,
    pub(crate) extension_stack: Vec<ExtensionFrame>,
}

impl ExtensionContext {
    fn is_empty(&self) -> bool {
        self.scope_stack.is_empty() && self.extension_stack.is_empty()
    }
}

thread_local! {
    static CONTEXTS: RefCell<HashMap<u64, ExtensionContext>> = RefCell::new(HashMap::new());
}

/// Runs `f` with mutable access to the current thread's context for the
/// given registry.
///
/// `f` must not call back into context functions; the borrow is held for
/// its duration.
pub(crate) fn with_context<R>(registry_id: u64, f: impl FnOnce(&mut ExtensionContext) -> R) -> R {
    CONTEXTS.with(|cell| {
        let mut map = cell.borrow_mut();
        let context = map.entry(registry_id).or_default();
        let result = f(context);
        // Drop the map entry once both stacks are empty again, so a
        // long-lived thread does not accumulate one per registry it touched.
        if context.is_empty() {
            map.remove(&registry_id);
        }
        result
    })
}

fn swap_context(registry_id: u64, context: ExtensionContext) -> ExtensionContext {
    CONTEXTS.with(|cell| {
        let mut map = cell.borrow_mut();
        let previous = if context.is_empty() {
            map.remove(&registry_id)
        } else {
            map.insert(registry_id, context)
        };
        previous.unwrap_or_default()
    })
}

/// A captured copy of one registry's thread-local resolution context.
///
/// Created by `ExtensionRegistry::backup_extension_context` and replayed on
/// an arbitrary execution via `ExtensionRegistry::run_in_context`.
#[derive(Clone)]
pub struct ExtensionContextBackup {
    pub(crate) registry_id: u64,
    pub(crate) context: ExtensionContext,
}

/// Installs a backup for the duration of `f`, restoring the previous
/// context afterward regardless of whether `f` unwinds.
pub(crate) fn run_with_context<R>(backup: &ExtensionContextBackup, f: impl FnOnce() -> R) -> R {
    struct RestoreGuard {
        registry_id: u64,
        previous: Option<ExtensionContext>,
    }

    impl Drop for RestoreGuard {
        fn drop(&mut self) {
            if let Some(previous) = self.previous.take() {
                swap_context(self.registry_id, previous);
            }
        }
    }

    let previous = swap_context(backup.registry_id, backup.context.clone());
    let _guard = RestoreGuard {
        registry_id: backup.registry_id,
        previous: Some(previous),
    };
    f()
}
