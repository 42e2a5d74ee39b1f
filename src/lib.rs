pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod llm;
pub mod models;
pub mod services;
pub mod version;
pub mod worker;

pub use error::ServiceError;
