//! Hub protocol surface: topic grammar, twin documents, event payloads

pub mod messages;
pub mod topics;
pub mod twin;

pub use messages::{DesiredPropertyPatch, MethodInvocation, MethodResponse};
pub use topics::InboundTopic;
pub use twin::{ack_payload, Twin, COMPONENT_TAG};
