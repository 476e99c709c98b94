//! Unit tests for the prediction SDK
//!
//! HTTP-level tests against a mock server, facade tests over a mocked
//! transport, and environment configuration tests.

pub mod config_tests;
