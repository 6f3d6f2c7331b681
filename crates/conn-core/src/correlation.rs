//! Correlation ids: the 16-byte key tying a response back to its request.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier, globally unique per outbound package.
///
/// Used as the primary key in [`crate::OperationTable`] and as the field
/// both `PackageOut` and `PackageIn` carry across the pipeline boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId([u8; 16]);

impl CorrelationId {
    /// Mint a fresh, globally-unique correlation id.
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn roundtrips_through_bytes() {
        let id = CorrelationId::new();
        let rebuilt = CorrelationId::from_bytes(*id.as_bytes());
        assert_eq!(id, rebuilt);
    }

    #[test]
    fn display_is_uuid_shaped() {
        let id = CorrelationId::new();
        assert_eq!(id.to_string().len(), 36);
    }
}
