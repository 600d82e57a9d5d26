mod error;
mod esplora;
mod gateway;

pub use error::*;
pub use esplora::*;
pub use gateway::*;

pub const NOT_FOUND_CODE: u16 = 404;
