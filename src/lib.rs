pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod normalize;
pub mod output;
pub mod transform;
pub mod worker;
