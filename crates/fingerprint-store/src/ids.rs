use serde::{Deserialize, Serialize};

/// Stable integer identity of a pip. Interconvertible with [`NodeId`]: the
/// engine above the core is free to alias the two, but the core treats them
/// as distinct newtypes so a pip id never leaks into graph-node APIs by
/// accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl From<NodeId> for PipId {
    fn from(n: NodeId) -> Self {
        PipId(n.0)
    }
}

impl From<PipId> for NodeId {
    fn from(p: PipId) -> Self {
        NodeId(p.0)
    }
}

impl std::fmt::Display for PipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pip#{}", self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node#{}", self.0)
    }
}
