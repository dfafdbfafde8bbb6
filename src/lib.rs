//! Usuarios API Library
//!
//! This library provides the core functionality for the Usuarios API:
//! CPF validation, user and address persistence on Postgres, postal-code
//! enrichment through ViaCEP, and the HTTP handlers that tie them together.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `data`: Data access layer.
//! - `integrations`: External service integrations.
//! - `obs`: Observability and metrics.
//! - `config`: Configuration management.
//! - `cpf`: CPF check-digit validation.
//! - `db`: Database connection, retry and schema bootstrap.
//! - `db_storage`: User and address storage operations.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `metrics`: Prometheus registry and request timing middleware.
//! - `models`: Data models and request payloads.
//! - `routes`: Router assembly.
//! - `services`: ViaCEP postal-code client.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;
pub mod obs;

// Re-export primary modules for shared use in tests and the binary
pub mod config;
pub mod cpf;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod services;
