//! Comment Service Library
//!
//! Handles the comment threads attached to marketplace feed posts: listing a
//! post's comment thread (top-level comments with their direct replies) and
//! creating new comments and replies. Author identities are resolved through
//! the external identity service on every read and write; every outbound
//! call runs under a fixed deadline so a slow collaborator cannot stall a
//! request indefinitely.
//!
//! # Modules
//!
//! - `handlers`: HTTP request handlers and route registration
//! - `models`: Comment rows, identity projections, wire shapes
//! - `services`: Comment read/write pipelines
//! - `identity`: Batched author-identity resolution
//! - `db`: Storage seam and PostgreSQL repository
//! - `middleware`: Correlation ids, request timing, bearer-token auth
//! - `error`: Error types and HTTP mapping
//! - `config`: Configuration management

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
