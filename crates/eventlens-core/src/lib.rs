pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod explorer;
pub mod extraction;
pub mod services;
pub mod store;
