//! Containment-path identifiers for extension points.
//!
//! A [`ClassIdentifier`] is an ordered, non-empty sequence of class tokens
//! describing a containment path, outermost first. A single-segment
//! identifier matches by ordinary supertype polymorphism; a multi-segment
//! identifier additionally requires the matching object to have been reached
//! through ancestors assignable to the earlier segments, in order.

use std::fmt;
use std::sync::Arc;

use trellis_core::meta::ClassToken;

/// An immutable, ordered, non-empty path of class tokens.
///
/// Cheap to clone; equality and hashing are by segment content.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClassIdentifier {
    segments: Arc<[ClassToken]>,
}

impl ClassIdentifier {
    /// Creates an identifier from a segment path, outermost first.
    ///
    /// # Panics
    ///
    /// Panics if `segments` is empty; an identifier must address at least
    /// one class.
    pub fn new(segments: Vec<ClassToken>) -> Self {
        assert!(!segments.is_empty(), "a ClassIdentifier requires at least one segment");
        Self {
            segments: segments.into(),
        }
    }

    /// Creates a single-segment identifier for `T`.
    pub fn of<T: 'static>() -> Self {
        Self::from(ClassToken::of::<T>())
    }

    /// Returns the number of segments.
    pub fn size(&self) -> usize {
        self.segments.len()
    }

    /// Returns the innermost segment, the type the identifier addresses.
    pub fn last_segment(&self) -> ClassToken {
        *self.segments.last().expect("non-empty by construction")
    }

    /// Returns all segments, outermost first.
    pub fn classes(&self) -> &[ClassToken] {
        &self.segments
    }

    /// Returns a new identifier with `token` appended as the innermost
    /// segment.
    pub fn appended(&self, token: ClassToken) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push(token);
        Self::new(segments)
    }
}

impl From<ClassToken> for ClassIdentifier {
    fn from(token: ClassToken) -> Self {
        Self {
            segments: Arc::from([token]),
        }
    }
}

impl fmt::Debug for ClassIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassIdentifier({self})")
    }
}

impl fmt::Display for ClassIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
