//! Domain types, error taxonomy, and configuration shared by every crate
//! in this workspace.

pub mod conf;
pub mod error;
pub mod models;

pub use conf::Conf;
pub use error::{Error, Result};
