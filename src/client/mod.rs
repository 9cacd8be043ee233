//! Hub client stack
//!
//! Layered so the testable parts stay pure: `connection` holds the session
//! state machine and broker option assembly, `correlator` the pending-request
//! table, `dispatch` the event routing, and `device` the impure client that
//! owns the transport and drives the other three.

pub mod connection;
pub mod correlator;
pub mod device;
pub mod dispatch;

pub use connection::SessionState;
pub use correlator::{CorrelatedResponse, RequestKind};
pub use device::DeviceClient;
