pub mod config;
pub mod diagnosis;
pub mod download;
pub mod error;
pub mod logging;
pub mod model;
pub mod pages;
pub mod pipeline;
pub mod preprocess;
pub mod routes;
pub mod upload;

pub use config::Config;
pub use error::AppError;
