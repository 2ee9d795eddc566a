pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult};
