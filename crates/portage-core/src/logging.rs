#![forbid(unsafe_code)]

//! Logging targets and optional subscriber setup.
//!
//! Every crate in the workspace logs through `tracing` with one of the dotted
//! targets below, so a filter such as `portage.queue=debug` isolates a single
//! subsystem.
//!
//! With the `tracing-json` feature enabled, [`init_json_logging`] installs a
//! JSON formatter filtered by an `EnvFilter` directive string.

/// Queue admission, dispatch, completion, and watchdog.
pub const TARGET_QUEUE: &str = "portage.queue";
/// Surface state transitions.
pub const TARGET_SURFACE: &str = "portage.surface";
/// Ownership moves and visibility changes.
pub const TARGET_LEDGER: &str = "portage.ledger";
/// Portal target registration and buffering.
pub const TARGET_REGISTRY: &str = "portage.registry";
/// Frame assignment and measurement.
pub const TARGET_LAYOUT: &str = "portage.layout";

/// All targets, in the order they appear in documentation.
pub const ALL_TARGETS: [&str; 5] = [
    TARGET_QUEUE,
    TARGET_SURFACE,
    TARGET_LEDGER,
    TARGET_REGISTRY,
    TARGET_LAYOUT,
];

/// Error returned when the global subscriber cannot be installed.
#[cfg(feature = "tracing-json")]
#[derive(Debug)]
pub enum LoggingInitError {
    /// The filter directive string did not parse.
    Filter(tracing_subscriber::filter::ParseError),
    /// A global subscriber was already installed.
    AlreadyInstalled(tracing_subscriber::util::TryInitError),
}

#[cfg(feature = "tracing-json")]
impl std::fmt::Display for LoggingInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filter(e) => write!(f, "invalid log filter: {e}"),
            Self::AlreadyInstalled(e) => write!(f, "subscriber already installed: {e}"),
        }
    }
}

#[cfg(feature = "tracing-json")]
impl std::error::Error for LoggingInitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Filter(e) => Some(e),
            Self::AlreadyInstalled(e) => Some(e),
        }
    }
}

/// Install a global JSON subscriber.
///
/// `filter` uses `EnvFilter` directive syntax, e.g.
/// `"portage.queue=debug,portage.surface=info"`.
#[cfg(feature = "tracing-json")]
pub fn init_json_logging(filter: &str) -> Result<(), LoggingInitError> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_new(filter).map_err(LoggingInitError::Filter)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(LoggingInitError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_share_the_portage_prefix() {
        for target in ALL_TARGETS {
            assert!(target.starts_with("portage."), "{target}");
        }
    }

    #[cfg(feature = "tracing-json")]
    #[test]
    fn bad_filter_is_rejected() {
        assert!(matches!(
            init_json_logging("portage.queue=notalevel"),
            Err(LoggingInitError::Filter(_))
        ));
    }
}
