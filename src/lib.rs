//! Turnstile - Concurrency Admission Control
//!
//! This crate limits how many units of work a client identifier may have
//! outstanding at once within a sliding time window. An admission increments
//! a per-identifier counter in a pluggable store (in-process map or shared
//! Redis) only while the counter is below the configured limit; a pool of
//! release workers decrements the counter again once the window elapses, and
//! a periodic cleanup task resets the store as a safety net against leaked
//! counters. The transport in front of the limiter supplies two hooks: an
//! identifier selector and a denial handler.

pub mod config;
pub mod error;
pub mod limiter;
pub mod store;

mod cleanup;
mod release;
