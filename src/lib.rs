//! Paratrans - paragraph-level document translation
//!
//! Long documents are cut into content-addressed segments, translated through a
//! bounded number of concurrent provider calls with two cache tiers in front,
//! and reassembled as a replacement or a bilingual rendering. A second entry
//! point translates caller-identified blocks in marker-multiplexed batches and
//! reports per-block progress events.

pub mod blocks;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod segment;
pub mod store;
pub mod translate;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_util;
