pub mod backend;
pub mod queries;
pub mod schema;
mod store_impl;

pub use backend::DuckDbBackend;
