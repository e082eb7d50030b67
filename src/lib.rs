//! # Label Migrator
//!
//! Reclassifies a sensitivity label on documents spread across a large,
//! multi-tenant file store, using two independent remote services: an
//! eventually-consistent content index for discovery and a mutation API
//! that addresses files by identity for the change itself.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐   ┌─────────┐
//! │ Index pages │──▶│ Normalizer │──▶│ Coordinator │──▶│ Resolver │──▶│ Mutator │
//! │ (cookie)    │   │ raw→record │   │ owns tally  │   │ url→item │   │ r/v/w   │
//! └─────────────┘   └────────────┘   └──────┬──────┘   └──────────┘   └─────────┘
//!                                           ▼
//!                                  audit log + results
//! ```
//!
//! The index can lag reality by days, so every record is verified against
//! the live label immediately before a write, and re-running a migration
//! is safe: records that already carry the target label are skipped.
//!
//! ## Quick Start
//!
//! ```bash
//! lmig check --mode live          # validate configuration
//! lmig discover                   # list files and sites to provision
//! lmig migrate --dry-run          # full pipeline, no writes
//! lmig migrate                    # live run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and run settings |
//! | [`models`] | Records, handles, outcomes, tally |
//! | [`normalize`] | Raw index row → canonical record |
//! | [`enumerate`] | Paged, loop-safe index enumeration |
//! | [`resolve`] | Location → live handle via share token |
//! | [`mutate`] | Per-record read-verify-mutate gates |
//! | [`coordinator`] | Discovery and migration runs |
//! | [`traits`] | Collaborator seams |
//! | [`index_client`] | HTTP index service |
//! | [`graph_client`] | Graph mutation API |
//! | [`export`] | Audit log and report artifacts |
//! | [`progress`] | Operator progress on stderr |

pub mod config;
pub mod coordinator;
pub mod enumerate;
pub mod error;
pub mod export;
pub mod graph_client;
pub mod index_client;
pub mod models;
pub mod mutate;
pub mod normalize;
pub mod progress;
pub mod resolve;
pub mod traits;
