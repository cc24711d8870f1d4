pub mod accounting;
pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod qif;
pub mod sources;

#[cfg(test)]
mod engine_tests;
