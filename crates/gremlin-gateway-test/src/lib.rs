//! Test harnesses for the Gremlin gateway.
//!
//! Provides `StubEngine`, a scripted Gremlin server, and `TestGateway` for
//! full-stack tests over real sockets.

#[cfg(test)]
mod e2e;
pub mod engine;
pub mod gateway;

pub use engine::{Reply, StubEngine};
pub use gateway::{TestError, TestGateway};
