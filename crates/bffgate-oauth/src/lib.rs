//! OIDC relying-party client for the bffgate authentication gateway.
//!
//! # Components
//!
//! - [`pkce`] - PKCE verifier/challenge pairs and opaque random tokens
//! - [`oidc`] - discovery, authorization URL, code exchange, refresh, end-session URL

pub mod error;
pub mod oidc;
pub mod pkce;

pub use error::{OAuthError, Result};
pub use oidc::{
    DEFAULT_EXPIRES_IN_SECS, DEFAULT_IDP_TIMEOUT, DiscoveryDocument, OidcClient, OidcConfig,
    TokenResponse,
};
pub use pkce::{PkceChallenge, challenge_for, generate_state, random_token};
