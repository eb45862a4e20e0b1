pub mod api;
pub mod error;
pub mod events;
pub mod gate;
pub mod models;

pub use error::Error;
