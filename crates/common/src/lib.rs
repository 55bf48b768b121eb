//! Reusable utils for services that handle common behavior, such as initializing the tracing
//! framework and reading environment knobs.

pub mod env;
pub mod logging;
