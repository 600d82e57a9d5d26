mod config;
mod keys;

pub use config::*;
pub use keys::*;
