//! Type-safe identifier wrappers.
//!
//! The game server hands every connected agent a small integer index. The
//! index is the only identity the core ever sees for its own team: another
//! agent's identity is never revealed through percepts and must be inferred
//! by the strategist.
//!
//! Identifiers are totally ordered so that merges can be made deterministic
//! (between equally sized graphs, the lower identifier's absorbs the other).

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a `u32` index with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an identifier from its raw index.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the inner index.
            pub const fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of one agent on our own team.
    AgentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_by_index() {
        let low = AgentId::new(2);
        let high = AgentId::new(11);
        assert!(low < high);
        assert_eq!(low.min(high), low);
    }

    #[test]
    fn id_serializes_as_bare_number() {
        let json = serde_json::to_string(&AgentId::new(7)).unwrap_or_default();
        assert_eq!(json, "7");
        let back: Result<AgentId, _> = serde_json::from_str("7");
        assert_eq!(back.ok(), Some(AgentId::new(7)));
    }

    #[test]
    fn id_displays_raw_index() {
        assert_eq!(AgentId::from(3).to_string(), "3");
        assert_eq!(u32::from(AgentId::new(9)), 9);
    }
}
