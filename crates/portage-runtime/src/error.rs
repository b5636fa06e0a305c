#![forbid(unsafe_code)]

//! Error taxonomy.
//!
//! Every failure here is recovered locally. The queue never halts because
//! one operation failed; the worst user-visible outcome is that a requested
//! visual change does not happen (plus an optional `onDiagnostic` event).

use std::fmt;

use portage_core::{NodeId, SurfaceId, TargetId};

use crate::config::ConfigError;
use crate::ledger::Owner;
use crate::surface_config::SurfaceConfigError;

/// A reparent named an owner the node no longer has.
///
/// This indicates a logic bug in the caller and is always surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrentReparentError {
    pub node: NodeId,
    /// Owner the caller believed the node had.
    pub expected: Owner,
    /// Owner recorded in the ledger.
    pub actual: Owner,
}

impl fmt::Display for ConcurrentReparentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stale reparent of {}: expected owner {}, actual owner {}",
            self.node, self.expected, self.actual
        )
    }
}

impl std::error::Error for ConcurrentReparentError {}

/// Ledger operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    UnknownNode(NodeId),
    DuplicateNode(NodeId),
    ConcurrentReparent(ConcurrentReparentError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode(node) => write!(f, "{node} is not tracked by the ledger"),
            Self::DuplicateNode(node) => write!(f, "{node} is already tracked by the ledger"),
            Self::ConcurrentReparent(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConcurrentReparent(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConcurrentReparentError> for LedgerError {
    fn from(value: ConcurrentReparentError) -> Self {
        Self::ConcurrentReparent(value)
    }
}

/// Content was submitted to a target nobody registered, without
/// create-on-demand. The content is held in the target's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTargetError {
    pub target: TargetId,
    /// Nodes now waiting in the buffer.
    pub buffered: usize,
}

impl fmt::Display for UnknownTargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "portal target '{}' is not registered; {} node(s) buffered",
            self.target, self.buffered
        )
    }
}

impl std::error::Error for UnknownTargetError {}

/// A present was requested for a surface that is already active. Benign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicatePresentationError {
    pub surface: SurfaceId,
}

impl fmt::Display for DuplicatePresentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is already presented", self.surface)
    }
}

impl std::error::Error for DuplicatePresentationError {}

/// A dismiss was requested with nothing presented. Benign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoActiveSurfaceError {
    pub surface: SurfaceId,
}

impl fmt::Display for NoActiveSurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not presented", self.surface)
    }
}

impl std::error::Error for NoActiveSurfaceError {}

/// Why a native presentation did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The host had no window or context to present into.
    NoActiveWindow,
    /// The host refused the call.
    HostRejected(String),
    /// No native callback arrived before the watchdog deadline.
    WatchdogExpired,
    /// The owning node unmounted while the operation was in flight.
    TornDown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveWindow => f.write_str("no active window"),
            Self::HostRejected(detail) => write!(f, "host rejected: {detail}"),
            Self::WatchdogExpired => f.write_str("native callback did not arrive in time"),
            Self::TornDown => f.write_str("surface torn down"),
        }
    }
}

impl FailureReason {
    /// Short machine-readable code used in diagnostic payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveWindow => "no_active_window",
            Self::HostRejected(_) => "host_rejected",
            Self::WatchdogExpired => "watchdog_expired",
            Self::TornDown => "torn_down",
        }
    }
}

/// The host environment could not complete a presentation or dismissal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePresentationFailure {
    pub surface: SurfaceId,
    pub reason: FailureReason,
}

impl fmt::Display for NativePresentationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native presentation of {} failed: {}", self.surface, self.reason)
    }
}

impl std::error::Error for NativePresentationFailure {}

/// Any error produced by this crate.
#[derive(Debug)]
pub enum Error {
    Ledger(LedgerError),
    UnknownTarget(UnknownTargetError),
    DuplicatePresentation(DuplicatePresentationError),
    NoActiveSurface(NoActiveSurfaceError),
    Presentation(NativePresentationFailure),
    SurfaceConfig(SurfaceConfigError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger(e) => write!(f, "{e}"),
            Self::UnknownTarget(e) => write!(f, "{e}"),
            Self::DuplicatePresentation(e) => write!(f, "{e}"),
            Self::NoActiveSurface(e) => write!(f, "{e}"),
            Self::Presentation(e) => write!(f, "{e}"),
            Self::SurfaceConfig(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ledger(e) => Some(e),
            Self::UnknownTarget(e) => Some(e),
            Self::DuplicatePresentation(e) => Some(e),
            Self::NoActiveSurface(e) => Some(e),
            Self::Presentation(e) => Some(e),
            Self::SurfaceConfig(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<LedgerError> for Error {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ConcurrentReparentError> for Error {
    fn from(value: ConcurrentReparentError) -> Self {
        Self::Ledger(LedgerError::ConcurrentReparent(value))
    }
}

impl From<UnknownTargetError> for Error {
    fn from(value: UnknownTargetError) -> Self {
        Self::UnknownTarget(value)
    }
}

impl From<DuplicatePresentationError> for Error {
    fn from(value: DuplicatePresentationError) -> Self {
        Self::DuplicatePresentation(value)
    }
}

impl From<NoActiveSurfaceError> for Error {
    fn from(value: NoActiveSurfaceError) -> Self {
        Self::NoActiveSurface(value)
    }
}

impl From<NativePresentationFailure> for Error {
    fn from(value: NativePresentationFailure) -> Self {
        Self::Presentation(value)
    }
}

impl From<SurfaceConfigError> for Error {
    fn from(value: SurfaceConfigError) -> Self {
        Self::SurfaceConfig(value)
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
