//! fl - command line for FL programs
//!
//! Parses, compiles, runs and packages small image programs against a
//! compute device, and queues plugin/package changes for the next start.
//!
//! # Structure
//!
//! - [`driver`]: sequences a batch command over a validated job list
//! - [`pipeline`]: background image writers fed by `fl run`
//! - [`actions`]: the append-only startup action log
//! - [`resolve`]: input expansion, extension checks, output synthesis
//! - [`backend`]: the parser, codec, device and encoder contracts, with the
//!   CPU host implementation

pub mod actions;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod repo;
pub mod resolve;

pub use cli::{Cli, Commands};
pub use context::FlContext;
pub use driver::{BatchArgs, BatchCommand, Driver};
pub use error::FlError;
