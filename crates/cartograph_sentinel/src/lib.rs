//! Cartograph's job-processing core.
//!
//! A bounded pool of workers claims `created` jobs from the database and
//! drives each through the exploration pipeline under a per-job
//! cancellation token and deadline. The control plane exposes the
//! transport-agnostic create/list/get/stop operations.

pub mod control;
pub mod controller;
pub mod pool;
pub mod sentinel;
pub mod stops;

pub use control::{ControlError, ControlPlane};
pub use controller::{BridgeFactory, JobController};
pub use pool::{WorkNotifier, WorkerPool};
pub use sentinel::Sentinel;
pub use stops::StopRegistry;
