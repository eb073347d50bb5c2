// src/ingest/providers/mod.rs
pub mod article;
pub mod browser;
pub mod rss;
