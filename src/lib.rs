//! Gatehouse is an authenticating reverse proxy for multi-tenant upstream APIs.
//!
//! Each inbound request carries a signed token naming a tenant instance.
//! The gateway verifies it, resolves the tenant, picks one of the tenant's
//! upstream credentials, optionally signs the body, and forwards the call
//! to the tenant's provider endpoint.
//!
//! Everything a request learns on the way is carried in an immutable,
//! per-request [`RequestContext`](context::RequestContext) that each
//! pipeline stage derives from the previous one.
//!
//! # Architecture
//!
//! - [`auth`] -- Bearer token extraction and HS256 JWT verification.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`context`] -- The request context carrier, its typed bindings, and the
//!   credential selection policy.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- Pipeline stages: request ID, authentication, tenant
//!   resolution.
//! - [`proxy`] -- Target resolution, upstream headers, signing, and forwarding.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |

// Public items serve the binary and the integration tests.
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod server;
