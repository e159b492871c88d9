use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(self) -> Uuid {
                self.0
            }

            /// Parse from the canonical hyphenated string form used in storage.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// Simulated entity IDs
define_id!(CharacterId);
define_id!(ItemId);
define_id!(NpcId);
define_id!(PartyId);
define_id!(LocationId);

// Narrative event IDs
define_id!(EventId);

// Per-tenant world clock row ID
define_id!(ClockId);

macro_rules! define_opaque_id {
    ($name:ident) => {
        /// Opaque external identifier (a chat-platform snowflake); never
        /// parsed, only compared and stored.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

// Tenant partition key: one isolated game world per chat community
define_opaque_id!(TenantId);

// Channel binding for events (where notifications are delivered)
define_opaque_id!(ChannelId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_through_string() {
        let id = CharacterId::new();
        let parsed = CharacterId::parse(&id.to_string()).expect("canonical form parses");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_tenant_id_is_opaque() {
        let a = TenantId::from("guild-123");
        let b = TenantId::new("guild-123");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "guild-123");
    }

    #[test]
    fn test_distinct_ids_differ() {
        assert_ne!(ItemId::new(), ItemId::new());
    }
}
