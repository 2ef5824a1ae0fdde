//! crowd-cast OBS control layer
//!
//! Drives an embedded libobs context through a handful of lifecycle operations.
//! Blocking engine calls run as background jobs that report through futures, and
//! the resources an output session acquires are released on every exit path.

pub mod api;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod logging;

pub use api::ObsApi;
pub use config::Config;
pub use error::{ApiError, NOT_INITIALIZED};
