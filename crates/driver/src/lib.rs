//! Dispatch and execution of geophysical forward and inversion runs.
//!
//! This crate takes validated options from `geoinv-options` and drives them
//! through an external inversion library:
//!
//! - **Dispatch**: maps `inversion_type` and `forward_only` to a route before
//!   anything is opened or launched
//! - **Engine seam**: [`InversionEngine`] runs the library; [`ProcessEngine`]
//!   launches it as a child process
//! - **Store seam**: [`DataStore`] handles are opened once per run and receive
//!   the run's artifacts once, after the engine has finished
//! - **Sweeps**: [`SweepDriver`] expands a sweep file and executes the runs on
//!   a thread pool, each against its own copy of the store
//!
//! # Usage
//!
//! ```ignore
//! let driver = InversionDriver::new(ProcessEngine::new(), ManifestOpener);
//! match driver.run_file(Path::new("gravity.ui.json"))? {
//!     RunOutcome::Completed(summary) => println!("{} artifacts", summary.artifacts.len()),
//!     RunOutcome::SweepTemplate(path) => println!("sweep template at {}", path.display()),
//! }
//! ```

pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod store;
pub mod sweep_driver;

pub use dispatch::{dispatch, dispatch_ui, DispatchError, Route};
pub use driver::{DriverError, InversionDriver, RunOutcome, RunSummary};
pub use engine::{
    Artifact, ArtifactKind, EngineError, EngineOutput, InversionEngine, ProcessEngine, RunRequest,
};
pub use store::{DataStore, ManifestOpener, ManifestStore, StoreError, StoreOpener};
pub use sweep_driver::{DriverStats, DryRunStats, JobError, SweepDriver};
