#![forbid(unsafe_code)]

//! Portage public facade crate.
//!
//! Re-exports the types a host integration needs from the internal crates and
//! offers a [`ContextBuilder`] plus a prelude for day-to-day use.
//!
//! ```ignore
//! use portage::prelude::*;
//!
//! let mut ctx = ContextBuilder::new()
//!     .config(RuntimeConfig::default().min_operation_gap(Duration::from_millis(150)))
//!     .env_overrides(true)
//!     .build(MyHost::new(), MyLayout::new())?;
//! ctx.on_mount(anchor, None, NodeRole::SurfaceAnchor { surface })?;
//! ctx.present(surface, SurfaceConfig::default().detents([Detent::Medium, Detent::Large]))?;
//! ```

use tracing::debug;

// --- Core re-exports -------------------------------------------------------

pub use portage_core::{
    Clock, EventName, EventPayload, EventTarget, EventValue, Frame, HostHandle, NodeEvent, NodeId,
    OperationId, Size, SurfaceId, SystemClock, TargetId,
};

// --- Layout re-exports -----------------------------------------------------

pub use portage_layout::{Detent, LayoutEngine, NoLayout};

// --- Runtime re-exports ----------------------------------------------------

pub use portage_runtime::{
    CompletedOperation, ConfigError, DismissOrigin, Error, FailureReason, HeaderAction, HeaderConfig,
    HeaderSlot, HostFailure, NativePresentationFailure, NodeRole, OperationOutcome, Owner, Placement,
    PresentationContext, PresentationHost, Result, RuntimeConfig, SkipReason, SurfaceConfig,
    SurfaceConfigError, SurfaceState, TargetRegistration, TransitionStyle, Visibility,
};

// --- Builder ---------------------------------------------------------------

/// Builds a [`PresentationContext`] from a validated [`RuntimeConfig`].
#[must_use]
pub struct ContextBuilder {
    config: RuntimeConfig,
    env_overrides: bool,
    clock: Option<Box<dyn Clock>>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            env_overrides: false,
            clock: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply `PORTAGE_*` environment variables on top of the config at build time.
    pub fn env_overrides(mut self, enabled: bool) -> Self {
        self.env_overrides = enabled;
        self
    }

    /// Replace the system clock, e.g. with a manually advanced one.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Validate the config and build the context.
    pub fn build<H, L>(self, host: H, layout: L) -> Result<PresentationContext<H, L>>
    where
        H: PresentationHost,
        L: LayoutEngine,
    {
        let config = if self.env_overrides {
            self.config.with_env_overrides()
        } else {
            self.config
        };
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors).into());
        }
        debug!(
            min_operation_gap_ms = config.min_operation_gap_ms,
            watchdog_timeout_ms = ?config.watchdog_timeout_ms,
            emit_diagnostics = config.emit_diagnostics,
            "building presentation context"
        );
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));
        Ok(PresentationContext::with_clock(host, layout, config, clock))
    }
}

// --- Prelude ---------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        ContextBuilder, Detent, DismissOrigin, Error, EventName, Frame, LayoutEngine, NodeEvent,
        NodeId, NodeRole, OperationOutcome, PresentationContext, PresentationHost, Result,
        RuntimeConfig, SurfaceConfig, SurfaceId, SurfaceState, TargetId,
    };

    pub use crate::{core, layout, runtime};

    pub use std::time::Duration;
}

pub use portage_core as core;
#[cfg(feature = "harness")]
pub use portage_harness as harness;
pub use portage_layout as layout;
pub use portage_runtime as runtime;
