//! Tiered cache core.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`entry`]: Entry and TierLevel definitions
//! - [`tier`]: One capacity- and TTL-bounded concurrent store
//! - [`tracker`]: Per-key access frequency and recency
//! - [`policy`]: Migration policy deciding a key's tier
//! - [`stats`]: Hot-path counters and the statistics snapshot
//! - [`hierarchy`]: Orchestrates lookups, placement, promotion and demotion
//! - [`prefetcher`]: Speculative loads of keys adjacent to hot keys

pub mod entry;
pub mod hierarchy;
pub mod policy;
pub mod prefetcher;
pub mod stats;
mod stripes;
pub mod tier;
pub mod tracker;
