//! Extension points for embedders.
//!
//! Every method has a pass-through default, so implementors only override
//! the values they want to rewrite.

use crate::{auth::CurrentUser, store::Value};

pub trait Hooks: Send + Sync {
    /// Option names always loaded alongside any requested ones.
    fn option_defaults(&self, names: Vec<String>) -> Vec<String> {
        names
    }

    /// Suffix of the auth cookie name, computed from the normalized site URL.
    fn cookie_hash(&self, hash: String, _site_url: &str) -> String {
        hash
    }

    /// Nonce lifetime in seconds for `action`.
    fn nonce_life(&self, _action: &str, life: i64) -> i64 {
        life
    }

    /// Identity mixed into nonces issued to anonymous visitors.
    fn logged_out_uid(&self, uid: u64, _action: &str) -> String {
        uid.to_string()
    }

    fn current_user(&self, user: CurrentUser) -> CurrentUser {
        user
    }

    fn user_meta(&self, value: Value, _user_id: u64, _key: &str) -> Value {
        value
    }

    /// Value about to be written by `update_user_meta`.
    fn update_user_meta(&self, value: Value, _user_id: u64, _key: &str) -> Value {
        value
    }

    /// Action requested by an HTTP caller, before dispatch.
    fn request_action(&self, action: Option<String>) -> Option<String> {
        action
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}
