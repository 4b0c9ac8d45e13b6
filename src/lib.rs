// Library interface for testing
pub mod approval;
pub mod audit;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod database;
pub mod error;
pub mod gateway;
pub mod labs;
pub mod models;
pub mod query;
pub mod seed;
pub mod store;
pub mod time;
pub mod traits;
pub mod wizard;

pub use error::{ReservationError, ValidationErrors};
