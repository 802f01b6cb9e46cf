//! Identifier types shared by the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&$name> for $name {
            fn from(id: &$name) -> Self {
                id.clone()
            }
        }
    };
}

string_id!(
    /// Globally unique id of a simulation object.
    ObjectId
);

string_id!(
    /// Id of a host process.
    HostId
);

/// A peer with a recent call relationship to an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Partner {
    /// Another object, resolved to its host at notification time
    Object(ObjectId),
    /// A host holding a proxy to the object
    Host(HostId),
}

/// Where an object lives as seen from one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "host", rename_all = "snake_case")]
pub enum Location {
    Local,
    Remote(HostId),
}

impl Location {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    /// Resolve to a host id given the viewing host.
    pub fn host<'a>(&'a self, viewer: &'a HostId) -> &'a HostId {
        match self {
            Self::Local => viewer,
            Self::Remote(host) => host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = ObjectId::new("pump");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"pump\"");
        assert_eq!(id.to_string(), "pump");
    }

    #[test]
    fn test_partner_ordering_is_stable() {
        let mut partners = vec![
            Partner::Host(HostId::new("H2")),
            Partner::Object(ObjectId::new("b")),
            Partner::Object(ObjectId::new("a")),
        ];
        partners.sort();
        assert_eq!(partners[0], Partner::Object(ObjectId::new("a")));
        assert_eq!(partners[2], Partner::Host(HostId::new("H2")));
    }

    #[test]
    fn test_location_host() {
        let me = HostId::new("H1");
        assert_eq!(Location::Local.host(&me), &me);
        assert_eq!(Location::Remote(HostId::new("H2")).host(&me).as_str(), "H2");
    }
}
