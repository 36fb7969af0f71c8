//! Liveness and readiness probes

pub mod controllers;
