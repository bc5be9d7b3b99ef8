//! Replica bridge - event-driven replication between services.
//!
//! The owning service raises domain events through an in-process dispatcher;
//! a publishing handler externalizes them onto a broker topic. The consuming
//! service runs a consumer pool whose replication handler upserts each
//! inbound record into its local replica.

pub mod bus;
pub mod config;
pub mod dlq;
pub mod event;
pub mod replication;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
