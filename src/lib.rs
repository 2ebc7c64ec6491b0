//! Turnstile - Admission Control for the Blog API
//!
//! This crate gates inbound HTTP traffic with a per-client fixed-window rate
//! limiter before any handler runs. Denied requests get `429 Too Many
//! Requests` with a `Retry-After` hint; admitted requests pass through
//! untouched. Key state is bounded by a periodic eviction sweep and an
//! optional cap on tracked keys.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
