pub mod controller;
pub mod http;

pub use controller::{ChatApi, ChatController};
pub use http::HttpChatApi;
