pub mod api;
pub mod config;
pub mod emotion;
pub mod types;

pub use config::*;
pub use emotion::*;
pub use types::*;
