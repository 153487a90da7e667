//! Data models

mod address;
mod audit;
mod organization;

pub use address::*;
pub use audit::*;
pub use organization::*;
