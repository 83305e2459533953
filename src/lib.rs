//! Per-user ordered rankings of rated movies and shows.
//!
//! The [`services::RankingEngine`] places newly rated titles with a short series of
//! pairwise comparisons and keeps positions, star tiers and display scores consistent
//! through inserts, manual moves and removals. [`api`] exposes it over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
