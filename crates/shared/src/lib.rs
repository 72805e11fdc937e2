pub mod cache;
pub mod domain;
pub mod error;
pub mod protocol;

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod protocol_tests;
