pub mod builtin;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod gate;
pub mod io;
pub mod paths;
pub mod project;
pub mod state;
pub mod store;
pub mod types;
pub mod workflow;

pub use error::{F5Error, Result};
