pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod parallel;
pub mod pipeline;
pub mod processor;
pub mod select;
pub mod state;
pub mod transport;
