//! Transport adapters
//!
//! [`Transport`] is the seam between the client core and the wire.
//! [`WsTransport`] talks to a real host; [`MockTransport`] is an in-memory
//! host for tests.

pub mod frame;
pub mod handlers;
pub mod mock;
pub mod traits;
pub mod ws;

pub use frame::{Frame, HandshakeAuth};
pub use handlers::HandlerRegistry;
pub use mock::{MockTransport, ReceivedFrame, Responder};
pub use traits::{AnyHandler, DisconnectReason, EventHandler, LifecycleEvent, Transport};
pub use ws::WsTransport;
