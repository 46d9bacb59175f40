//! # Sessiongate (session verification without the host application)
//!
//! `sessiongate` answers "who is this browser?" for a site whose sessions,
//! options and users live in a `MySQL` database shaped like a classic PHP CMS,
//! without booting that application.
//!
//! ## Request model
//!
//! Every request builds an [`auth::RequestContext`] over a shared
//! [`store::Store`]. The context owns the per-request caches (options, user
//! meta, the auth cookie) and samples the clock once, so everything it
//! computes is consistent for the lifetime of the request.
//!
//! ## Verification
//!
//! The auth cookie (`login|expiration|token|mac`) is matched against the
//! session collection stored in user meta under `sha256(token)`. Capabilities
//! come from the user's capability meta merged with the site role map.
//!
//! ## Nonces and fingerprints
//!
//! Nonces are bound to the action, the user, the session token and a
//! half-lifetime tick. Fingerprints are HMACs of the user id under a salt that
//! rotates daily and is stored as an option.

pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
