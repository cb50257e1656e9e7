//! Application layer containing the service's core logic.
//!
//! `PremiumService` is the entry point for every externally visible
//! operation. It composes the lazily loaded inference engine, the
//! best-effort query log and the payment reconciler, which turns racing
//! poll and webhook notifications into at most one payment record per
//! invoice.

pub mod inference;
pub mod query_log;
pub mod reconciler;
pub mod service;
