//! Wire types for the page/native/host boundaries.
//!
//! ## Module Structure
//!
//! - `correlation_id` - CorrelationId type scoping one in-flight page call
//! - `message` - BridgeMessage parsed from the page transport
//! - `reply` - HostReply and HostError returned by the host runtime
//! - `resource` - ResourceRequest/ResourceResponse for synchronous interception

mod correlation_id;
mod message;
mod reply;
mod resource;

pub use correlation_id::CorrelationId;
pub use message::{BridgeMessage, Settlement};
pub use reply::{ErrorCodes, HostError, HostReply};
pub use resource::{ResourceRequest, ResourceResponse};
