pub mod config;
pub mod data;
pub mod market;
pub mod monitoring;
pub mod scoring;
pub mod store;
pub mod sync;
