// Shared test harness for integration and contract tests.
//
// Builds a BillingEngine over the in-memory store, a manually driven clock, a recording fake
// gateway and a broadcast event sink, so every test controls time, gateway behaviour and can
// observe emitted domain events.
//
// Usage:
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//   use helpers::*;

#![allow(dead_code)]

pub mod fake_gateway;
pub mod test_engine;

pub use fake_gateway::*;
pub use fixtures::*;
pub use test_engine::*;
