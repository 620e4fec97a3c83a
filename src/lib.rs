//! # Record Locator
//!
//! Finds a scanned student record (an image in a year-partitioned S3-compatible
//! bucket) and the identity data behind it, given a student code or an
//! eight-digit national ID.
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────┐
//!   GET /search ─▶ classify   │
//!                └─────┬──────┘
//!          ┌───────────┴────────────┐
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ record index│          │  partitions │
//!   └──────┬──────┘          └──────┬──────┘
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  registry   │          │   locator   │──▶ S3 list + presign
//!   └──────┬──────┘          └──────┬──────┘
//!          └───────────┬────────────┘
//!                      ▼
//!                 SearchResult
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=...
//! rloc search 2015100234          # one-off search, JSON on stdout
//! rloc upload ./scans             # populate the bucket
//! rloc serve                      # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`classify`] | National ID vs code; partition hint |
//! | [`config`] | TOML configuration parsing |
//! | [`locator`] | Partition scan and signed link |
//! | [`models`] | Core data types |
//! | [`records`] | In-memory record index |
//! | [`registry`] | External identity registry |
//! | [`search`] | Orchestration and response assembly |
//! | [`server`] | HTTP server |
//! | [`storage`] | S3-compatible client (SigV4) |
//! | [`upload`] | Folder uploader |

pub mod classify;
pub mod config;
pub mod locator;
pub mod models;
pub mod records;
pub mod registry;
pub mod search;
pub mod server;
pub mod storage;
pub mod upload;

#[cfg(test)]
mod testing;
