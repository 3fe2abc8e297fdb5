//! Tabular Hotswap
//!
//! Retargets the connections of a tabular analytical model between a local
//! engine and a hosted workspace without restarting the tools attached to
//! it. The engine modules are usable on their own; [`routes`] exposes them
//! over HTTP.

pub mod config;
pub mod connection;
pub mod detector;
pub mod error;
pub mod health;
pub mod models;
pub mod process;
pub mod report;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod swapper;
pub mod tabular;
