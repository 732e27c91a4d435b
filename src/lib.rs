// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! SeismoScan - Seismic Station Quality-Assurance Scanner
//!
//! Scans daily archives of broadband seismometer recordings and produces
//! numerical quality metrics per station, per channel, per calendar day:
//! calibrated, band-limited power-spectral-density estimates and the scalar
//! metrics derived from them (deviation from Peterson's noise models,
//! coherence between channel pairs), with content-addressed change detection
//! so unchanged station-days are never recomputed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SeismoScan Pipeline                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │
//! │  │ Waveform │→ │ CrossPower│→ │  Metrics  │→ │  Metric   │  │
//! │  │   Data   │  │  Engine   │  │ NLNM/Coh  │  │   Store   │  │
//! │  └──────────┘  └───────────┘  └───────────┘  └───────────┘  │
//! │       ↑              ↑              ↑              ↑        │
//! │  ┌──────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │
//! │  │ Station  │  │ Response  │  │  Digest   │  │  SQLite   │  │
//! │  │ Metadata │  │   Model   │  │   Layer   │  │           │  │
//! │  └──────────┘  └───────────┘  └───────────┘  └───────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One station-day is the unit of work: the scan runs every configured
//! metric over one day of one station's channels, sharing a single
//! cross-power cache, and stores each scalar with a digest of the inputs
//! that produced it.

pub mod config;
pub mod data;
pub mod db;
pub mod demo;
pub mod digest;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod psd;
pub mod scan;
pub mod timeseries;

// Re-exports for convenience
pub use config::Config;
pub use data::{ContiguousBlock, DataSet, MetricData};
pub use db::MetricStore;
pub use error::ScanError;
pub use metadata::{Channel, ChannelKey, ChannelMeta, Station, StationMeta};
pub use metrics::{Metric, MetricResult, PowerBand, StationDay, StationMetric};
pub use psd::{CrossPower, CrossPowerCache};
pub use scan::Scanner;

/// SeismoScan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SeismoScan name
pub const NAME: &str = "SeismoScan";
