//! Core types and algorithms for the Strata order-status ledger.
//!
//! Raw status-change events are sequenced per entity, materialized into
//! contiguous bitemporal intervals, kept up to date incrementally, and
//! resolved against a calendar spine for point-in-time questions.
//!
//! This crate is free of HTTP and database dependencies; storage backends
//! implement [`store::LedgerStore`].

pub mod error;
pub mod event;
pub mod interval;
pub mod maintain;
pub mod resolve;
pub mod sequence;
pub mod store;

pub use error::{Error, Result};
