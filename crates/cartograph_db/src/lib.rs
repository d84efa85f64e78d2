//! Persistence layer for Cartograph.
//!
//! Concrete sqlx pool (SQLite by default, PostgreSQL behind a feature) plus
//! the repositories that own all row mutation: the job claim queue, the
//! versioned procedure chains, the project/endpoint catalog, and run
//! artefact links.

pub mod catalog;
pub mod error;
pub mod jobs;
pub mod pool;
pub mod procedures;
pub mod runs;
pub mod schema;

pub use catalog::{CatalogStore, Endpoint, Project};
pub use error::{DbError, Result};
pub use jobs::{Job, JobStats, JobStore, JobUpdate, NewJob};
pub use pool::{Db, DbConfig, DbPool, PoolError};
pub use procedures::{DraftDiff, DraftUpdate, NewProcedure, Procedure, ProcedureStore};
pub use runs::{RunAsset, RunStore, StepNote};
pub use schema::init_schema;
