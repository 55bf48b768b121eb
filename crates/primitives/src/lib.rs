//! Data types shared by the proving orchestrator, the broker and the provers.

pub mod block;
pub mod buf;
pub mod epoch;
pub mod hash;
pub mod jobs;
pub mod proof;
pub mod state;
pub mod tx;

pub mod prelude;
