//! File upload service: validates a base64 upload, stores it, records its
//! metadata and emails a notification.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
