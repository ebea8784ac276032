//! Inbound webhook plumbing shared by all integrations.
//!
//! # Overview
//!
//! - [`WebhookRegistry`]: maps webhook ids to handlers
//! - [`WebhookHandler`]: the trait an integration implements to receive pushes
//! - [`WebhookRequest`] / [`WebhookResponse`]: server-independent request and
//!   response types
//! - [`WebhookError`]: registration errors
//!
//! Webhook ids are generated with [`WebhookId::generate`](crate::WebhookId::generate)
//! and served at `/api/webhook/{webhook_id}` by the router returned from
//! [`Hub::router`](crate::Hub::router). Unknown ids are answered with an empty
//! `200 OK` so a caller probing ids learns nothing.
//!
//! # Example
//!
//! ```rust
//! use hub_integrations::webhooks::{WebhookMethod, WebhookRequest, WebhookResponse};
//!
//! let request = WebhookRequest::new(WebhookMethod::Head, Vec::new());
//! assert!(!request.has_body());
//!
//! let response = WebhookResponse::message("Invalid method", 2);
//! assert_eq!(response.code(), Some(2));
//! ```

mod errors;
mod registry;
mod types;

pub use errors::WebhookError;
pub use registry::{WebhookRegistry, WebhookRoute};
pub use types::{WebhookHandler, WebhookMethod, WebhookRequest, WebhookResponse};
