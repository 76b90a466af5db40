//! Physics Error Types
//!
//! Unified error type for the contact dynamics core. Only structural
//! configuration problems are errors: a contact naming a body outside the
//! current index range, a material id the table does not know, or an invalid
//! solver/stepper parameter. These are fatal for the step and are surfaced to
//! the caller of [`Stepper::step`](crate::stepper::Stepper::step).
//!
//! Numeric anomalies (zero-length normals, near-zero effective mass,
//! non-finite iterates) and solver non-convergence are absorbed internally
//! and reported through diagnostics instead.

use crate::material::MaterialId;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PhysicsError {
    /// A contact references a body index outside the re-indexed range.
    #[error("contact {contact} references body index {index} out of range (count={count})")]
    InvalidBodyIndex {
        /// Position of the offending contact in the contact list
        contact: usize,
        /// The invalid index that was provided
        index: usize,
        /// Current number of bodies
        count: usize,
    },
    /// A contact names the same body on both sides.
    #[error("contact {contact} names body {body} on both sides")]
    SelfContact {
        /// Position of the offending contact in the contact list
        contact: usize,
        /// The duplicated body index
        body: usize,
    },
    /// A body or pair references a material the table does not contain.
    #[error("unknown material id {material}")]
    UnknownMaterial {
        /// The unregistered material id
        material: MaterialId,
    },
    /// Invalid configuration parameter.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

impl PhysicsError {
    /// Every variant is a configuration error: fatal for the current step.
    ///
    /// Kept as a method so callers can match on the class rather than on
    /// individual variants.
    #[inline]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidBodyIndex { .. }
                | Self::SelfContact { .. }
                | Self::UnknownMaterial { .. }
                | Self::InvalidConfiguration { .. }
        )
    }
}

/// Crate result alias
pub type Result<T> = core::result::Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = PhysicsError::InvalidBodyIndex {
            contact: 2,
            index: 7,
            count: 3,
        };
        assert_eq!(
            e.to_string(),
            "contact 2 references body index 7 out of range (count=3)"
        );

        let e = PhysicsError::UnknownMaterial { material: 9 };
        assert_eq!(e.to_string(), "unknown material id 9");

        let e = PhysicsError::InvalidConfiguration {
            reason: "time step must be positive",
        };
        assert_eq!(
            e.to_string(),
            "invalid configuration: time step must be positive"
        );
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        let e = PhysicsError::SelfContact {
            contact: 0,
            body: 1,
        };
        takes_error(&e);
        assert!(e.is_configuration());
    }
}
