//! # Fleet Corpus
//!
//! Vehicle-inventory ingestion into versioned XML documents, with
//! analytical queries over the whole stored corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Tabular  │──▶│  Mapper  │──▶│ Encoder  │──▶│  Schema  │──▶│  Store   │
//! │  rows    │   │ records  │   │   XML    │   │ validate │   │ append   │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘   └────┬─────┘
//!                                                                  │
//!                      extract → filter → dedup → aggregate        ▼
//!                 ┌──────────┐       ┌──────────┐           ┌──────────┐
//!                 │   CLI    │◀──────│  Query   │◀──────────│ Extract  │
//!                 │ (fleet)  │       │  engine  │           │  paths   │
//!                 └──────────┘       └──────────┘           └──────────┘
//! ```
//!
//! Every stored row is an immutable snapshot of one batch. The same vehicle
//! may appear in many rows; queries answer per distinct vehicle identifier,
//! keeping the earliest stored snapshot among those matching the filter.
//!
//! ## Quick Start
//!
//! ```bash
//! fleet init
//! fleet ingest ./carros_1.csv
//! fleet query brand toyota
//! fleet serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Records, documents, and query results |
//! | [`error`] | Error taxonomy |
//! | [`tabular`] | Delimited text parsing |
//! | [`mapper`] | Row → vehicle record mapping |
//! | [`encode`] | Vehicle report → XML |
//! | [`schema`] | Document validation |
//! | [`store`] | Append-only document stores |
//! | [`extract`] | Field extraction from stored documents |
//! | [`query`] | Corpus query engine |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`webhook`] | Completion notifications |
//! | [`server`] | HTTP upload and query server |
//! | [`stats`] | Corpus overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod encode;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod mapper;
pub mod migrate;
pub mod models;
pub mod query;
pub mod schema;
pub mod server;
pub mod stats;
pub mod store;
pub mod tabular;
pub mod webhook;
