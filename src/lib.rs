//! # JCYL Open Data Bot
//!
//! Core of a Telegram bot for the Castilla y León open data catalog:
//! paged browsing and search over a catalog API whose own filters cannot be
//! trusted, short tokens for oversized callback payloads, and snapshot-based
//! change alerts for subscribed themes, datasets and keywords.

pub mod alerts;
pub mod api_config;
pub mod api_errors;
pub mod callback_map;
pub mod catalog;
pub mod circuit_breaker;
pub mod dataset_model;
pub mod db;
pub mod settings;
