//! Shared models used across all features

pub mod models;
