mod config;
mod error;
mod filter;
mod key;

pub use error::*;

pub use config::*;
pub use filter::*;
pub use key::*;
