//! Authentication: strategy selection, login flows, and the token cache
//!
//! Supported flows:
//! - Pre-issued static token (no authentication)
//! - Signed sts-identity login with explicit or assumed-role credentials
//! - Interactive username/password + MFA login
//! - Platform-metadata identity (EC2 / ECS / Lambda) with the legacy
//!   role-based login and KMS ciphertext decryption

pub mod iam;
pub mod kms;
pub mod resolver;
pub mod sts;
pub mod token;
pub mod user;

pub use resolver::IdentityDescriptor;
pub use token::{AuthToken, TokenPayload};
pub use user::{PromptProvider, TerminalPrompt};
