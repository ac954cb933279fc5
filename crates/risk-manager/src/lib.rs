pub mod models;
pub mod sizer;
#[cfg(test)]
mod tests;

pub use models::*;
pub use sizer::{classify_volatility, RiskSizer};
