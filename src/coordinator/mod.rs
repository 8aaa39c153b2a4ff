pub mod coordinator;
pub mod state;

pub use state::{Coordinator, EndpointRecord, GatewayHint, NetworkRecord};
