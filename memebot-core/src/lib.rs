pub mod classifier;
pub mod config;
pub mod error;
pub mod error_utils;
pub mod format;
pub mod selector;
pub mod types;

pub use classifier::*;
pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use format::*;
pub use selector::*;
pub use types::*;
