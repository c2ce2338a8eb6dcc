//! Typed dependency lifecycle events
//!
//! Published on an unbounded channel instead of re-entrant callbacks;
//! the application context consumes them and turns them into
//! notifications.

/// Events emitted by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyEvent {
    /// A sync run is about to invoke the external tool
    SyncStarted { env: String },
    /// A sync run finished, one way or the other
    SyncCompleted {
        env: String,
        success: bool,
        message: String,
    },
    /// Several plugins constrained one package; a winner was selected
    ConflictResolved {
        package: String,
        candidates: Vec<String>,
        chosen: String,
    },
    /// No constraint for this package could be parsed; it was omitted
    ResolutionFailed { package: String },
    /// Direct install of a single package finished
    PackageInstalled {
        env: String,
        package: String,
        success: bool,
        message: String,
    },
    /// The environment's installed set changed
    EnvironmentUpdated { env: String },
}
