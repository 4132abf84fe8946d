//! Logging for errors that are reported and then dropped.
//!
//! Used where nobody is left to handle a failure: control commands racing
//! completion, event forwarding, forced terminal transitions.

use std::fmt::Display;
use std::panic::Location;

use crate::error::{EngineError, EngineResult};

pub trait ResultExt<T, E> {
    /// Log an `Err` at error level with `context` and the caller location.
    /// The result is returned unchanged.
    ///
    /// ```ignore
    /// let _ = sink.forward(case, event).await.log("forwarding event");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(e) = &self {
            let caller = Location::caller();
            tracing::error!(
                target: "branchline",
                error = %e,
                caller = %caller,
                context = %context.to_string(),
                "Dropped error"
            );
        }
        self
    }
}

/// For store writes that can lose a race with the execution's other
/// writer.
pub trait RaceResultExt<T> {
    /// Like [`ResultExt::log`], except that a lost race is routine and
    /// logged at debug level.
    fn log_race<S: ToString>(self, context: S) -> EngineResult<T>;
}

impl<T> RaceResultExt<T> for EngineResult<T> {
    #[track_caller]
    fn log_race<S: ToString>(self, context: S) -> EngineResult<T> {
        let lost = matches!(&self, Err(e) if e.is_lost_race());
        if !lost {
            return self.log(context);
        }
        if let Err(e) = &self {
            tracing::debug!(
                target: "branchline",
                error = %e,
                context = %context.to_string(),
                "Execution already moved on"
            );
        }
        self
    }
}

pub trait OptionResultExt<T> {
    /// Log a `None` at warn level.
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            let caller = Location::caller();
            tracing::warn!(
                target: "branchline",
                caller = %caller,
                context = %context.to_string(),
                "Missing value"
            );
        }
        self
    }
}
