#![cfg_attr(not(test), warn(clippy::unwrap_used))]

pub mod batcher;
pub mod client;

pub use batcher::SummaryBatcher;
pub use client::{SteamApiClient, SummaryFetcher, VanityResolver, VanityUrlResolution};
