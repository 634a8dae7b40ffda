#![allow(dead_code)] // each integration test binary uses a subset

pub mod builders;
pub mod strategies;

pub use builders::*;
