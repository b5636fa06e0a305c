#![forbid(unsafe_code)]

//! Portage Runtime
//!
//! Portals and overlay surfaces on top of a host view tree.
//!
//! # Key Components
//!
//! - [`Ledger`] - the single authority on which location owns each content node
//! - [`Registry`] - portal targets, buffered content, and relocation records
//! - [`PresentationQueue`] - one global FIFO with a single in-flight slot
//! - [`SurfaceController`] - pure lifecycle machine for one overlay surface
//! - [`PresentationContext`] - ties the above to a [`PresentationHost`] and a
//!   layout engine, and is the only type most hosts touch
//!
//! # Role in Portage
//! `portage-runtime` is the orchestrator. Reconciliation tells it what mounted
//! where; the application asks it to present, dismiss, and relocate; the host
//! reports native callbacks and gestures back. Every node move goes through
//! the ledger, every native transition goes through the queue.
//!
//! # How it fits in the system
//! Identifiers, geometry, and events come from `portage-core`; content
//! stacking and detents come from `portage-layout`. `portage-harness` provides
//! scripted hosts for tests, and the `portage` facade re-exports everything.

pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod ledger;
pub mod queue;
pub mod registry;
pub mod surface;
pub mod surface_config;

pub use config::{ConfigError, RuntimeConfig};
pub use context::{NodeRole, PresentationContext};
pub use error::{
    ConcurrentReparentError, DuplicatePresentationError, Error, FailureReason, LedgerError,
    NativePresentationFailure, NoActiveSurfaceError, Result, UnknownTargetError,
};
pub use host::{HostFailure, PresentationHost};
pub use ledger::{Ledger, Owner, Placement, Visibility};
pub use queue::{
    CompletedOperation, Completion, InFlight, OperationKind, OperationOutcome,
    PresentationOperation, PresentationQueue, QueueStats, SkipReason,
};
pub use registry::{
    RegisterOutcome, RegistrationOrigin, Registry, RelocatedNode, SubmitOutcome, TargetRegistration,
};
pub use surface::{
    DismissOrigin, SurfaceController, SurfaceEffect, SurfaceEvent, SurfaceNoopReason, SurfaceState,
    SurfaceTransition, TeardownReason,
};
pub use surface_config::{
    HeaderAction, HeaderConfig, HeaderSlot, SurfaceConfig, SurfaceConfigError, TransitionStyle,
};
