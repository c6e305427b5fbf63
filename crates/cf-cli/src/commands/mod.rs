//! CLI command implementations

pub(crate) mod cleanup;
pub(crate) mod common;
pub(crate) mod create_db;
pub(crate) mod run;
pub(crate) mod tiers;
pub(crate) mod vocabulary;
