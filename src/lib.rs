//! # Hub Integrations
//!
//! Config flows, config entries and webhook plumbing for a home-automation
//! hub, with two integrations: Glances system monitoring and Withings health
//! data.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe host configuration via [`HubConfig`] and [`HubConfigBuilder`]
//! - Validated newtypes for credentials, URLs and webhook ids
//! - A config entry store with versioning and unique-id deduplication via [`entries`]
//! - Multi-step config flows, including OAuth external steps, via [`flow`]
//! - Webhook registration and dispatch via [`webhooks`]
//! - The [`Hub`] host tying integrations, entries, flows and webhooks together
//! - The [`glances`] and [`withings`] integrations
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use hub_integrations::glances::GlancesIntegration;
//! use hub_integrations::withings::WithingsIntegration;
//! use hub_integrations::{HostUrl, Hub, HubConfig};
//!
//! let config = HubConfig::builder()
//!     .external_url(HostUrl::new("https://hub.example.com").unwrap())
//!     .build();
//!
//! let hub = Hub::builder()
//!     .config(config)
//!     .integration(Arc::new(GlancesIntegration::new()))
//!     .integration(Arc::new(WithingsIntegration::new()))
//!     .build();
//!
//! // Serve webhooks and the OAuth callback
//! let _router = hub.router();
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: every integration and entry lives inside a [`Hub`]
//! - **Fail-fast validation**: newtypes and static config validate on construction
//! - **Thread-safe**: the hub and integrations are `Send + Sync`
//! - **Async-first**: designed for use with the Tokio runtime

use std::future::Future;
use std::pin::Pin;

pub mod auth;
pub mod config;
pub mod entries;
pub mod error;
pub mod flow;
pub mod glances;
pub mod hub;
pub mod webhooks;
pub mod withings;

/// Boxed future returned by the object-safe async traits of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use config::{ClientId, ClientSecret, HostUrl, HubConfig, HubConfigBuilder, WebhookId};
pub use error::ConfigError;

pub use hub::{Hub, HubBuilder, HubError, Integration, SetupError, TaskTracker, WeakHub};
