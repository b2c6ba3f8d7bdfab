//! Mock speech service for integration tests
//!
//! Simulates the read-aloud synthesis endpoint over a local WebSocket with
//! scripted misbehavior:
//! - Connection drops after a number of turns
//! - Early audio before `turn.start`
//! - Foreign correlation ids

// Not every test uses every knob
#![allow(dead_code)]

pub mod edge_mock;

pub use edge_mock::{EdgeMockServer, Handshake, MockBehavior};
