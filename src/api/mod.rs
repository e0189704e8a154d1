//! HTTP API of the enermap backend.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/cm/` - List calculation modules with their parameter schemas
//! - `POST /api/cm/{name}/task/` - Submit a calculation task
//! - `GET /api/cm/{name}/task/{id}/` - Task snapshot (status, result, error)
//! - `DELETE /api/cm/{name}/task/{id}/` - Delete a task, cancelling its worker
//! - `GET|HEAD /api/cm/{name}/task/{id}/download/` - Download the task's artifact
//! - `GET /api/datasets/` - Full dataset inventory
//! - `GET /api/datasets/areas/` - Selection-area levels
//! - `GET /api/datasets/layer_name/{id}/` - Renderable layer name (plain text)
//! - `GET /api/datasets/legend/{layer_name}` - Legend of a renderable layer

pub mod cm;
pub mod datasets;
mod routes;
pub mod types;

pub use routes::{serve, AppState};
pub use types::*;
