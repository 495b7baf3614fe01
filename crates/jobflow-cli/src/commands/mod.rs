//! Command implementations for jobflow

pub mod operations;
pub mod session;
pub mod status;
pub mod submit;

pub use operations::operations;
pub use session::{login, logout};
pub use status::status;
pub use submit::{poll, submit};
