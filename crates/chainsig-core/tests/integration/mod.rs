//! Integration tests module
//!
//! End-to-end flows: derive -> build -> sign -> assemble across chains.

pub mod signing_flow_test;
