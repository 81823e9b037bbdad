//! Integration tests for kafka-connect-resetter-core.
//!
//! These tests require Docker and use Testcontainers to spin up
//! a real Kafka broker for testing against actual broker behavior.
//!
//! Test categories:
//! - Sink Reset: OffsetDelete and DeleteGroups against a live coordinator
//! - Source Reset: tombstoning a shared offsets topic

pub mod common;
