//! Worker-driven stages: build, deploy and remove.
//!
//! Each stage walks the generated components, launches one worker per
//! component and collects the results into a `StageReport`.

pub mod report;
pub mod runner;
pub mod stage;

pub use report::{StageReport, WorkerOutcome, WorkerStatus};
pub use runner::StageRunner;
pub use stage::{HostIdentity, Stage, StageSpec};
