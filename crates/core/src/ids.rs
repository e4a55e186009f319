//! Identifier types
//!
//! Every identifier is a 128-bit value wrapped in its own newtype so a
//! snapshot id can never be passed where a snapshot-set id is expected.
//! Equality is by value. Conversion to and from the provider layout goes
//! through [`crate::codec`].

use crate::codec::{to_guid, to_native_id, NativeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// The all-zero identifier
            pub const NULL: Self = Self(Uuid::nil());

            /// Create a new random identifier using UUID v4
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Create an identifier from raw bytes
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Raw bytes of this identifier
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parse from a string representation
            ///
            /// Accepts standard UUID format (with or without hyphens or braces).
            /// Returns None if the string is not a valid UUID.
            pub fn from_string(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }

            /// Check for the all-zero identifier
            pub fn is_null(&self) -> bool {
                self.0.is_nil()
            }

            /// Convert into the provider's native layout
            pub fn to_native(&self) -> NativeId {
                to_native_id(self.0)
            }

            /// Convert from the provider's native layout
            pub fn from_native(id: NativeId) -> Self {
                Self(to_guid(id))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{{{}}}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identity of a snapshot set (a group of snapshots created atomically)
    SnapshotSetId
);

define_id!(
    /// Identity of a single snapshot
    SnapshotId
);

define_id!(
    /// Identity of a snapshot provider
    ///
    /// `ProviderId::NULL` lets the system pick the provider.
    ProviderId
);

define_id!(
    /// Writer class identity (shared by every instance of a writer)
    WriterId
);

define_id!(
    /// Identity of one running writer instance
    WriterInstanceId
);
