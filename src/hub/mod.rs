//! The `hub` module owns the set of sessions connected to this node.
//!
//! All registration, deregistration, routing and sweeping is funnelled
//! through one control loop, so the session set needs no lock. Other
//! components only ever see a [`HubHandle`].

pub mod engine;

pub use engine::{Hub, HubEvent, HubHandle};
