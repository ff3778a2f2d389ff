use std::fmt;

use uuid::Uuid;

/// Name of this node in the cluster: `<hostname>-<uuid>`.
///
/// Generated once per process. The random suffix means a restarted node
/// never reuses a name whose counter entry peers may still hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Build a fresh identity from the local hostname.
    pub fn generate() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self::with_host(&host)
    }

    /// Build a fresh identity for an explicit host name.
    pub fn with_host(host: &str) -> Self {
        Self(format!("{host}-{}", Uuid::new_v4()))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<NodeIdentity> for String {
    fn from(id: NodeIdentity) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_has_host_prefix_and_uuid_suffix() {
        let id = NodeIdentity::with_host("box");
        let suffix = id.as_str().strip_prefix("box-").unwrap();
        assert!(Uuid::parse_str(suffix).is_ok());
    }

    #[test]
    fn identities_are_unique() {
        assert_ne!(NodeIdentity::generate(), NodeIdentity::generate());
    }
}
