#![forbid(unsafe_code)]

//! Core: identifiers, geometry, event payloads, and clocks.
//!
//! # Role in Portage
//! `portage-core` holds the vocabulary every other crate speaks. It owns the
//! stable identifier newtypes for nodes, surfaces, and portal targets, the
//! frame geometry handed around by the layout engine, the flat key-value event
//! payloads delivered to the application, and the clock abstraction the
//! runtime uses for its gap and watchdog timers.
//!
//! # How it fits in the system
//! The runtime (`portage-runtime`) consumes these types to drive the ledger,
//! registry, queue, and surface controllers. The layout crate
//! (`portage-layout`) only needs ids and frames, so it depends on this crate
//! and nothing else from the workspace.

pub mod clock;
pub mod event;
pub mod geometry;
pub mod id;
pub mod logging;

pub use clock::{Clock, SystemClock};
pub use event::{EventLog, EventName, EventPayload, EventTarget, EventValue, NodeEvent};
pub use geometry::{Frame, Size};
pub use id::{HostHandle, NodeId, OperationId, SurfaceId, TargetId};
