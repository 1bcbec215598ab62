//! Graph traversal the runtime analyzer needs for changed-pips frontier
//! propagation is an explicit trait rather than an owned graph: building
//! and owning the pip graph is this core's explicit non-goal (§1), so the
//! analyzer only asks "who transitively depends on this pip" of whatever
//! the engine above it supplies.

use fingerprint_store::PipId;

pub trait DependentsProvider: Send + Sync {
    /// Direct dependents of `pip` (one hop). The analyzer walks the
    /// transitive closure itself.
    fn dependents_of(&self, pip: PipId) -> Vec<PipId>;
}

/// A provider with no graph at all — every pip is its own component.
/// Useful for tests and for hosts that don't want frontier propagation.
pub struct NoDependents;

impl DependentsProvider for NoDependents {
    fn dependents_of(&self, _pip: PipId) -> Vec<PipId> {
        Vec::new()
    }
}
