//! Command handlers

pub mod migrate;
pub mod serve;
