//! Minimal HTTP/1.1 client pieces: one GET request and a response-head scanner.

mod request;
mod response;

pub use request::{RequestError, write_get_request};
pub use response::{HeadProgress, ResponseHeadScanner};
