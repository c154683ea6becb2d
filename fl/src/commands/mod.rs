//! CLI command implementations.

pub mod completions;
pub mod pack;
pub mod parse;
pub mod plugins;
pub mod repo;
pub mod run;
pub mod unpack;
