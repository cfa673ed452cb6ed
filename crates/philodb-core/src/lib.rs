pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod html;
pub mod logging;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
