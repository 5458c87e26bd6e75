//! Broker bindings.
//!
//! - `websocket`: subscribes to a popsub broker over WebSocket
//! - `memory`: in-process broker used by the `demo` command and by tests
//!
//! Both implement [`SubscriberService`](crate::subscriber::SubscriberService).

pub mod memory;
pub mod message;
pub mod websocket;

pub use memory::MemoryService;
pub use message::{ClientMessage, ServerMessage};
pub use websocket::WebSocketService;

#[cfg(test)]
mod tests;
