pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod parse;
pub mod record;
pub mod store;
pub mod types;

pub use error::{IngestError, Result};
