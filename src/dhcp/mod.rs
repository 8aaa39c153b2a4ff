pub mod client;
pub mod event;
pub mod hostname;
pub mod supervisor;

pub use client::{ClientConfig, Family};
pub use supervisor::{Lease, Supervisor};
