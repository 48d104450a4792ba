//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, upgrade detection, host bridge)
//!     → App::handle
//!         → handler.rs   (POST: body.rs → envelope → execute → one JSON reply)
//!         → websocket.rs (plain WebSocket: one reply per frame)
//!         → session      (graphql-ws)
//! ```

pub mod body;
pub mod handler;
pub mod server;
pub mod websocket;

pub use body::{BodyAssembler, BodyChunks, BodyError};
pub use handler::HttpHandler;
pub use server::HttpServer;
pub use websocket::WebsocketHandler;
