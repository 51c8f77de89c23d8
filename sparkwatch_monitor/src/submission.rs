//! Interfaces the submitter hands over together with a tag.

use ::sparkwatch_common::application::{AppInfo, ApplicationState};

/// Callbacks invoked from the monitor worker on lifecycle events.
///
/// Callbacks run on the monitor worker itself and must not block it. Once a
/// terminal state has been observed, no further `state_changed` calls are
/// made.
pub trait ApplicationListener: Send + Sync {
    /// The application id of the submission became known.
    fn app_id_known(&self, app_id: &str);

    /// The application moved from `old` to `new`.
    fn state_changed(&self, old: ApplicationState, new: ApplicationState);

    /// At least one [AppInfo] field changed relative to the last emission.
    fn info_changed(&self, info: AppInfo);
}

/// Handle to the local spark-submit child process, owned by the monitor.
/// The monitor destroys the handle exactly once, regardless of how the
/// application ends.
pub trait DriverProcess: Send + Sync {
    /// Terminate the child process.
    fn destroy(&self);

    /// Lines captured from the child's stdout so far.
    fn input_lines(&self) -> Vec<String>;

    /// Lines captured from the child's stderr so far.
    fn error_lines(&self) -> Vec<String>;
}
