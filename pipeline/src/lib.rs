//! Batch runtime for the game analysis engine: evaluation cache, worker
//! pool, persistence and the adapters around the pure `analysis` core.

pub mod batch;
pub mod cache;
pub mod config;
pub mod persistence;
pub mod reference;
pub mod source;
