//! Registry items: immutable records of one registration.
//!
//! Each registration produces one item carrying the owner identifier it was
//! registered under and a monotonic registration sequence number. The
//! sequence number is the deterministic tie-break for resolution ordering
//! and is excluded from item equality: two items with identical declared
//! fields collide and both remain, since the registry stores lists per
//! owner, not sets.

use trellis_core::meta::ClassToken;

use crate::identifier::ClassIdentifier;

/// Common surface of all registry items, keyed for scope indexing.
pub trait RegistryItem: std::fmt::Debug + Send + Sync {
    /// The identifier this item is indexed under in a scope.
    fn scope_identifier(&self) -> &ClassIdentifier;

    /// The monotonic registration sequence number.
    fn sequence(&self) -> u64;
}

/// A registered extension or contribution class.
#[derive(Debug, Clone)]
pub struct ExtensionItem {
    owner: ClassIdentifier,
    target: ClassToken,
    declaring: Option<ClassToken>,
    new_model_order: Option<f64>,
    sequence: u64,
}

impl ExtensionItem {
    pub(crate) fn new(
        owner: ClassIdentifier,
        target: ClassToken,
        declaring: Option<ClassToken>,
        new_model_order: Option<f64>,
        sequence: u64,
    ) -> Self {
        Self {
            owner,
            target,
            declaring,
            new_model_order,
            sequence,
        }
    }

    /// The owner identifier this item was registered under.
    pub fn owner_identifier(&self) -> &ClassIdentifier {
        &self.owner
    }

    /// The registered extension or contribution class.
    pub fn target(&self) -> ClassToken {
        self.target
    }

    /// The declaring class, set only when the target was discovered nested
    /// inside another extension class. Used to resolve the enclosing
    /// instance at creation time.
    pub fn declaring(&self) -> Option<ClassToken> {
        self.declaring
    }

    /// Explicit order applied to created instances of ordered classes.
    pub fn new_model_order(&self) -> Option<f64> {
        self.new_model_order
    }
}

impl RegistryItem for ExtensionItem {
    fn scope_identifier(&self) -> &ClassIdentifier {
        &self.owner
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

// Equality over declared fields; the sequence number is identity, not state.
impl PartialEq for ExtensionItem {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.target == other.target
            && self.declaring == other.declaring
            && self.new_model_order == other.new_model_order
    }
}

/// A registered relocation of an ordered model object.
#[derive(Debug, Clone)]
pub struct MoveItem {
    model: ClassIdentifier,
    new_container: Option<ClassIdentifier>,
    new_order: Option<f64>,
    sequence: u64,
}

impl MoveItem {
    pub(crate) fn new(
        model: ClassIdentifier,
        new_container: Option<ClassIdentifier>,
        new_order: Option<f64>,
        sequence: u64,
    ) -> Self {
        Self {
            model,
            new_container,
            new_order,
            sequence,
        }
    }

    /// The identifier of the model object being moved.
    pub fn model_identifier(&self) -> &ClassIdentifier {
        &self.model
    }

    /// The requested new container, or `None` for "container unchanged".
    pub fn new_container(&self) -> Option<&ClassIdentifier> {
        self.new_container.as_ref()
    }

    /// The requested new order, or `None` for "order unchanged".
    pub fn new_order(&self) -> Option<f64> {
        self.new_order
    }
}

impl RegistryItem for MoveItem {
    fn scope_identifier(&self) -> &ClassIdentifier {
        &self.model
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl PartialEq for MoveItem {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model
            && self.new_container == other.new_container
            && self.new_order == other.new_order
    }
}
