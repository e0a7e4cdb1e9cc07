pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use middleware::AppState;
pub use openapi::ApiDoc;
