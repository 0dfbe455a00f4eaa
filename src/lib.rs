#![cfg_attr(not(test), warn(clippy::unwrap_used))]

pub mod dispatch;
pub mod error;
pub mod graph;
pub mod inject;
pub mod obligation_store;
pub mod parser;
pub mod progress;
pub mod provenance;
pub mod reason;
pub mod rule;
pub mod runner;

use std::path::PathBuf;

use clap::ValueEnum;
use strum::{Display, EnumString};

/// Which provenance schema the endpoint speaks. S-Prov workflows are
/// data-streaming (rules attach to ports), CWLProv workflows are
/// file-oriented (every connection carries a data item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display, EnumString)]
pub enum Scheme {
    #[default]
    #[value(name = "CWLPROV")]
    #[strum(serialize = "CWLPROV")]
    Cwlprov,
    #[value(name = "SPROV")]
    #[strum(serialize = "SPROV")]
    Sprov,
}

/// Everything one run needs to know. Built by the command line (or any other
/// front-end) and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint URL the provenance graphs are loaded from.
    pub endpoint: String,
    pub scheme: Scheme,
    /// Run all flow rules in a single combined interpreter pass instead of
    /// walking the graph batch by batch.
    pub all_in_one: bool,
    /// Rule database files, in increasing priority order.
    pub rule_db: Vec<PathBuf>,
    /// Purpose of this run, made visible to activation conditions.
    pub purpose: Option<String>,
    /// When set, data leaving the workflow counts as consumed by a virtual
    /// process with this function.
    pub virtual_action: Option<String>,
    /// Where to write derived data rules, if anywhere.
    pub write_to: Option<PathBuf>,
    /// Where to log activated obligations, if anywhere.
    pub obligation_log: Option<PathBuf>,
}
