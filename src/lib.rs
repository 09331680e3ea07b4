pub mod alto;
pub mod error;
pub mod library;
pub mod panic_handler;
pub mod render;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{Error, Result};
