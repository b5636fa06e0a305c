#![forbid(unsafe_code)]

//! Test harness for Portage.
//!
//! Everything here is deterministic: the host never calls back on its own,
//! the layout engine only knows the frames a test gives it, and time only
//! moves when [`ManualClock::advance`] is called.
//!
//! ```ignore
//! let mut sc = Scenario::default();
//! sc.mount_anchor(anchor, sheet, &[a, b])?;
//! sc.ctx_mut().present(sheet, SurfaceConfig::default())?;
//! sc.settle();
//! assert_eq!(sc.ctx().surface_state(sheet), Some(SurfaceState::Presented));
//! ```

pub mod clock;
pub mod host;
pub mod layout;
pub mod scenario;

pub use clock::ManualClock;
pub use host::{HostCall, PendingCallback, RecordingHost};
pub use layout::ScriptedLayout;
pub use scenario::{HarnessContext, Scenario};
