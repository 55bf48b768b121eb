//! Utilities shared by the integration tests: an in-process prover node wired from the real
//! broker, agents and native prover.

#![allow(dead_code)]

pub(crate) mod node;
