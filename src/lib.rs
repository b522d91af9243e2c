pub mod config;
pub mod consent;
pub mod discovery;
pub mod fallback;
pub mod fields;
pub mod gallery;
pub mod models;
pub mod navigator;
pub mod persist;
pub mod pipeline;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
