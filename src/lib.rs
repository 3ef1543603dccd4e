pub mod config;
pub mod entitlements;
pub mod error;
pub mod extractor;
pub mod routes;
