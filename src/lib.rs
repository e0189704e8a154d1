//! # enermap
//!
//! Backend of the enermap energy-mapping platform.
//!
//! The platform renders energy datasets on a map and runs named calculation
//! modules (CMs) against them. This crate provides:
//! - The REST API the map frontend talks to
//! - The asynchronous task lifecycle around CM execution
//! - The dataset catalog and the layer-name contract shared with the WMS
//!
//! ## Task Flow
//! 1. A submission is validated against the CM's parameter schema
//! 2. The task is recorded as `pending` and queued on the worker pool
//! 3. The worker marks it `running`, executes the CM, then records
//!    `success` (result document + optional artifact) or `failed`
//! 4. Clients poll the snapshot, then fetch the artifact and delete the task
//!
//! ## Modules
//! - `api`: axum routes and server bootstrap
//! - `cm`: calculation modules, their schemas and registry
//! - `task`: task records, stores, worker pool and dispatcher
//! - `datasets`: dataset catalog, layer names, remote catalog client

pub mod api;
pub mod cm;
pub mod config;
pub mod datasets;
pub mod error;
pub mod task;

pub use cm::{CalculationModule, CmRegistry};
pub use config::Config;
pub use datasets::DatasetCatalog;
pub use error::ApiError;
pub use task::{TaskDispatcher, TaskRecord, TaskStatus};
