pub mod cli;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod report;
pub mod scenario;
pub mod summary;
pub mod util;
