//! # unisearch-connector
//!
//! Platform connectors for unisearch: the [`Connector`] contract, the
//! per-account auth state machine, the normalized message model, and one
//! reference connector per platform family:
//!
//! - [`gmail`] — Email (Gmail REST API, label containers, `q` operators)
//! - [`slack`] — Team chat (cursor-paginated channels and history)
//! - [`lark`] — Enterprise IM (tenant token layered under the user token,
//!   `page_token`/`has_more` pagination, string epoch-ms timestamps)
//!
//! Each connector drives its platform's native pagination protocol to
//! exhaustion or a configured cap, applies the filters the platform cannot
//! evaluate server-side, and normalizes raw payloads into [`MessageResult`].
//! Failures are contained: a container that cannot be read is skipped, an
//! account that fails does not fail its siblings, and only token resolution
//! failure (or every container failing) fails a platform search.
//!
//! Connectors talk to their platform through a small per-platform API trait
//! (`GmailApi`, `SlackApi`, `LarkApi`) so tests can substitute synthetic
//! page sequences without a network.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod authenticator;
pub mod cancel;
mod connector;
mod error;
mod factory;
pub mod filter;
pub mod gmail;
pub mod lark;
pub mod model;
pub mod progress;
pub mod request;
pub mod slack;
pub mod time;

pub use auth::{AuthEvent, AuthResult, AuthState, UserInfo};
pub use authenticator::Authenticator;
pub use cancel::CancelToken;
pub use connector::{Connector, ConnectorSearchOutcome, search_accounts, sort_descending};
pub use error::{ConnectorError, Result};
pub use factory::{ConnectorConfig, build_connector};
pub use model::{AccountId, Attachment, MessageResult, MessageType, Platform, Sender};
pub use progress::{ProgressSink, ProgressUpdate, SearchStage};
pub use request::{ConnectorSearchRequest, DateRange, SearchFilters};
