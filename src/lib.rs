//! `net-dhcp`: a container network driver that places endpoints on an
//! existing host bridge and configures them via a real DHCP server on that
//! segment, instead of an internal IPAM.
//!
//! The binary entrypoint (`main.rs`) wires a [`config::Config`], an
//! [`engine::EngineClient`] and a [`coordinator::Coordinator`] together and
//! serves [`protocol::router`] over a UNIX socket. Everything else in this
//! crate is reachable from there.

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod dhcp;
pub mod engine;
pub mod error;
pub mod ip;
pub mod naming;
pub mod ns;
pub mod protocol;
