//! Public types for the Passerelle API.

mod message;
mod model;
mod request;

pub use message::{Message, MessageContent, Role};
pub use model::{ModelEntry, ModelTrait};
pub use request::{ClientRoute, ControlFlags, RouteKind, TargetShape, UpstreamBody, UpstreamRequest};
