//! HTTP/WebSocket API adapter.
//!
//! Inbound adapter serving the shared price stream, price lookup and
//! tournament orders.

mod controller;
mod health;
mod request;
mod response;
mod server;
mod ws;

pub use controller::{AppState, create_router};
pub use request::*;
pub use response::*;
pub use server::{HttpServer, ServerError};
