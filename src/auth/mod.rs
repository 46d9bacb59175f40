//! Request-scoped session verification.
//!
//! A [`RequestContext`] is built per request from a shared [`Store`] and
//! [`Settings`]. It answers who the caller is ([`RequestContext::current_user`]),
//! issues and checks nonces, and rotates the daily salt behind user
//! fingerprints. Failed authentication is `Ok(None)`, never an error.
//!
//! [`Store`]: crate::store::Store

pub mod capabilities;
pub mod context;
pub mod cookie;
pub mod hash;
pub mod hooks;
pub mod nonce;
pub mod options;
pub mod salt;
pub mod session;
pub mod settings;
pub mod user_meta;

pub use self::{
    capabilities::resolve,
    context::RequestContext,
    cookie::{AuthCookie, CookieJar},
    hash::Scheme,
    hooks::{DefaultHooks, Hooks},
    nonce::NonceAge,
    session::CurrentUser,
    settings::{Settings, VerifierHash},
};
