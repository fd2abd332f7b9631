#[macro_use]
extern crate log;
#[macro_use]
extern crate derive_builder;

pub mod aggregate;
pub mod analyzer;
pub mod crawler;
pub mod frontier;
pub mod http_analyzer;
pub mod persistence;
pub mod report;
pub mod runner;
pub mod types;
pub mod utils;
