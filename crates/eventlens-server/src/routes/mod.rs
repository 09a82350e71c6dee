pub mod dashboard;
pub mod events;
pub mod health;
pub mod sources;
pub mod uploads;
