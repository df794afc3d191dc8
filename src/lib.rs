//! Face detection and attribute classification service library

pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod api;
pub mod utils;

pub use config::Config;
pub use error::{FaceError, FaceResult};
