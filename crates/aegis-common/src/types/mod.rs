//! Core data types for Aegis

pub mod ids;
pub mod math;
pub mod withdrawal;
