pub mod alert;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod risk;
pub mod state;
pub mod status;
pub mod zone;
