//! Typed event dispatch and binary wire codec for the execution-log events
//! the core consumes (C8).
//!
//! Models the source's "subclassed event-target with overridable handlers"
//! shape as a tagged-union payload ([`ExecutionEvent`]) plus a consumer
//! trait object ([`EventConsumer`]), per §9's design note, generalized from
//! `aivcs_ci_domain::events::CIEvent`'s CI-lifecycle tagged union to the
//! nine build-engine event kinds named in spec §6.

mod dispatch;
mod error;
mod events;
mod frame;

pub use dispatch::{Dispatcher, EventConsumer, WorkerFanout};
pub use error::{IngressError, Result};
pub use events::{
    event_id, BuildManifestFileRecord, DirectoryMembershipHashed, ExecutionEvent,
    FingerprintComputationKind, PipCacheMiss, ProcessFingerprintComputed,
    RecordFileForBuildManifest, StrongFingerprintComputation,
};
pub use frame::{decode_event, encode_event, Frame};
