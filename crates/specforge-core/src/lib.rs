pub mod complexity;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod framework;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod plan;
pub mod preflight;
pub mod prompt;
pub mod script;
pub mod step;
pub mod store;
pub mod types;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use error::{ForgeError, Result};
