//! Domain-specific identifier types for Iceberg.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Table UUID wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct TableUuid(pub Uuid);

impl TableUuid {
    /// Creates a new table UUID wrapper.
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a fresh random table UUID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TableUuid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TableUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_uuid_serializes_as_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").expect("uuid");
        let json = serde_json::to_string(&TableUuid::new(uuid)).expect("serialize");
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn test_random_uuids_differ() {
        assert_ne!(TableUuid::random(), TableUuid::random());
    }
}
