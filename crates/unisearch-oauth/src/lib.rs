//! # unisearch-oauth
//!
//! `OAuth2` token material and the token-provider client used by the
//! unisearch connectors.
//!
//! The actual authorization UI and callback handling live outside this
//! workspace; connectors receive an authorization code out-of-band and use
//! this crate to exchange it for tokens, refresh expiring tokens, and read
//! or update stored credentials.
//!
//! ## Token exchange
//!
//! ```ignore
//! use unisearch_oauth::{HttpTokenProvider, TokenProvider};
//!
//! let provider = HttpTokenProvider::new("https://auth.example.com/oauth")?;
//! let exchanged = provider.exchange_code("authorization_code").await?;
//! println!("user: {}", exchanged.identity.name);
//! ```
//!
//! ## Refresh and the reauthorization signal
//!
//! A refresh that fails because the refresh token itself is dead surfaces as
//! [`Error::ReauthRequired`], distinct from transient HTTP failures. Callers
//! use that distinction to mark an account as needing manual re-auth rather
//! than retrying.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod provider;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use provider::{Exchanged, HttpTokenProvider, Identity, TokenProvider};
pub use store::{CredentialStore, MemoryCredentialStore};
pub use token::{ErrorResponse, Token, TokenResponse};
