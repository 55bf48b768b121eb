mod config;
pub mod proving;

pub use config::*;
