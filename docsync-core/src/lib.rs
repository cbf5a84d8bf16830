#![doc = "docsync-core: core logic library for docsync."]

//! Regenerates design docs, wiki pages, configuration files and deployment
//! manifests from a hand-maintained Source of Truth and per-subject YAML.
//!
//! # Usage
//! [`pipeline::Pipeline`] runs every component in order. Each module can also
//! be driven on its own; the `docsync` CLI does both.

pub mod atomic;
pub mod config;
pub mod config_sync;
pub mod contract;
pub mod crossref;
pub mod deploy;
pub mod docs_tree;
pub mod generator;
pub mod index;
pub mod markdown;
pub mod md_parser;
pub mod mermaid;
pub mod pipeline;
pub mod pr;
pub mod runner;
pub mod schema;
pub mod sot_parser;
pub mod sources;
pub mod templates;
pub mod toc;
