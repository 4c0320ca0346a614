//! Client for the Strongbox secrets-management backend.
//!
//! The client resolves an identity from its execution context (explicit
//! token or credentials, interactive login, assumed role, or EC2/ECS/Lambda
//! platform metadata), proves it to the backend via SigV4 request signing
//! or a challenge/response login, and caches the resulting short-lived
//! bearer token with single-flight refresh. Secrets are then read and
//! written with the cached token.
//!
//! ```no_run
//! use strongbox::{ClientConfig, StrongboxClient};
//!
//! # async fn run() -> strongbox::Result<()> {
//! let client = StrongboxClient::new(
//!     ClientConfig::new("https://strongbox.example.com").with_region("us-west-2"),
//! )?;
//!
//! let secret = client.read("app/service/db-credentials").await?;
//! println!("{}", secret["password"]);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod sign;

mod client;
mod http;

pub use auth::{AuthToken, IdentityDescriptor, PromptProvider, TerminalPrompt, TokenPayload};
pub use client::StrongboxClient;
pub use config::ClientConfig;
pub use errors::{Result, StrongboxError};
pub use sign::{sign_request, Credentials, SignedRequest};
