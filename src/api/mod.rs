//! API module - REST handlers and docs

pub mod rest;
pub mod dto;
pub mod docs;

pub use rest::create_rest_router;
