//! Request handlers.

pub mod health;
pub mod jobs;
pub mod submit;

pub use health::*;
pub use jobs::*;
pub use submit::*;
