//! `edgestudy` - Tooling for an empirical study of Edge AI repositories
//!
//! This library mines GitHub for repositories matching study search terms,
//! screens the raw tables through a series of treatment steps, checks the
//! integrity of the coded thematic-analysis dataset and computes the
//! descriptive analyses reported by the study.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod github;
pub mod logging;
pub mod mining;
pub mod model;
pub mod storage;
pub mod table;
pub mod treatment;

pub use config::Config;
pub use dataset::{IntegrityReport, StudyDataset, Violation};
pub use error::{Error, Result};
pub use github::{GithubClient, RepositorySource};
pub use logging::init_logging;
pub use mining::Miner;
pub use model::RepositoryRecord;
pub use storage::{CatalogStats, Storage};
pub use table::Table;
pub use treatment::Treatment;
