pub mod api;
pub mod error;
pub mod events;

pub use error::Error;
