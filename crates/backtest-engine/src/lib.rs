pub mod db;
pub mod engine;
pub mod error;
pub mod models;


pub use db::{BacktestDb, StoredBacktest};
pub use engine::BacktestEngine;
pub use error::BacktestError;
pub use models::*;
