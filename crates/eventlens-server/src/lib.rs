pub mod app;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod storage;
