//! CLI subcommands.

pub mod config;
pub mod fly;
pub mod inspect;
