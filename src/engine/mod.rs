pub mod reflector;

pub use reflector::{EngineClient, EngineNetwork, EndpointContainer};
