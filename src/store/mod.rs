//! Access to the host platform's relational tables.
//!
//! The verification path only needs three tables: options (per site), users
//! and user meta (both global). [`Store`] abstracts them so the same request
//! logic runs against MySQL ([`SqlStore`]) or an in-process map
//! ([`MemoryStore`]).

pub mod memory;
pub mod php;
pub mod sql;
mod value;

pub use self::memory::MemoryStore;
pub use self::sql::SqlStore;
pub use self::value::Value;

use crate::error::{Result, StoreError};
use indexmap::IndexMap;
use regex::Regex;
use secrecy::SecretString;
use std::{future::Future, pin::Pin};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Table prefix of one tenant.
///
/// Blog ids `0` and `1` use the base prefix, any other id `n` uses
/// `{base}{n}_`. Users and user meta are always global.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteScope {
    base_prefix: String,
    blog_id: u64,
}

impl SiteScope {
    /// # Errors
    /// Returns [`StoreError::InvalidPrefix`] unless the prefix matches `^[A-Za-z0-9_]+$`.
    pub fn new(base_prefix: impl Into<String>, blog_id: u64) -> Result<Self> {
        let base_prefix = base_prefix.into();
        if !valid_prefix(&base_prefix) {
            return Err(StoreError::InvalidPrefix(base_prefix));
        }
        Ok(Self {
            base_prefix,
            blog_id,
        })
    }

    #[must_use]
    pub fn with_blog_id(&self, blog_id: u64) -> Self {
        Self {
            base_prefix: self.base_prefix.clone(),
            blog_id,
        }
    }

    #[must_use]
    pub fn base_prefix(&self) -> &str {
        &self.base_prefix
    }

    #[must_use]
    pub fn blog_id(&self) -> u64 {
        self.blog_id
    }

    #[must_use]
    pub fn blog_prefix(&self) -> String {
        match self.blog_id {
            0 | 1 => self.base_prefix.clone(),
            id => format!("{}{id}_", self.base_prefix),
        }
    }

    #[must_use]
    pub fn options_table(&self) -> String {
        format!("{}options", self.blog_prefix())
    }

    #[must_use]
    pub fn users_table(&self) -> String {
        format!("{}users", self.base_prefix)
    }

    #[must_use]
    pub fn usermeta_table(&self) -> String {
        format!("{}usermeta", self.base_prefix)
    }

    /// User meta key holding the per-site capability set.
    #[must_use]
    pub fn capabilities_key(&self) -> String {
        format!("{}capabilities", self.blog_prefix())
    }

    /// Option holding the per-site role map.
    #[must_use]
    pub fn user_roles_option(&self) -> String {
        format!("{}user_roles", self.blog_prefix())
    }
}

fn valid_prefix(prefix: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]+$").is_ok_and(|re| re.is_match(prefix))
}

/// Row of the users table. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: u64,
    pub login: String,
    pub pass_hash: SecretString,
    pub email: String,
    pub display_name: String,
    pub nicename: String,
}

/// Which user meta rows to load.
#[derive(Clone, Copy, Debug)]
pub enum MetaQuery<'a> {
    /// Rows whose key is one of these names.
    Keys(&'a [String]),
    /// Rows whose key contains this substring.
    Containing(&'a str),
    All,
}

/// Relational store shared by every request.
///
/// Values come back decoded; a row that looks serialized but fails to decode
/// is a [`StoreError::Decode`].
pub trait Store: Send + Sync {
    /// Options present in the table among `names`. Missing names are absent
    /// from the result.
    fn load_options<'a>(
        &'a self,
        scope: &'a SiteScope,
        names: &'a [String],
    ) -> StoreFuture<'a, Vec<(String, Value)>>;

    /// Insert or replace one option in a single statement.
    fn upsert_option<'a>(
        &'a self,
        scope: &'a SiteScope,
        name: &'a str,
        value: &'a Value,
        autoload: bool,
    ) -> StoreFuture<'a, ()>;

    fn find_user_by_login<'a>(
        &'a self,
        scope: &'a SiteScope,
        login: &'a str,
    ) -> StoreFuture<'a, Option<UserRecord>>;

    /// Meta rows of one user in storage order. Keys may repeat.
    fn load_user_meta<'a>(
        &'a self,
        scope: &'a SiteScope,
        user_id: u64,
        query: MetaQuery<'a>,
    ) -> StoreFuture<'a, Vec<(String, Value)>>;

    /// Update the first row with this key or insert a new one.
    fn upsert_user_meta<'a>(
        &'a self,
        scope: &'a SiteScope,
        user_id: u64,
        key: &'a str,
        value: &'a Value,
    ) -> StoreFuture<'a, ()>;

    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// Collapse repeated keys, keeping the first row for each.
#[must_use]
pub fn first_wins(rows: Vec<(String, Value)>) -> IndexMap<String, Value> {
    let mut map = IndexMap::with_capacity(rows.len());
    for (key, value) in rows {
        map.entry(key).or_insert(value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_prefix_per_tenant() {
        let scope = SiteScope::new("wp_", 1).expect("valid prefix");
        assert_eq!(scope.blog_prefix(), "wp_");
        assert_eq!(scope.with_blog_id(0).blog_prefix(), "wp_");
        let tenant = scope.with_blog_id(7);
        assert_eq!(tenant.blog_prefix(), "wp_7_");
        assert_eq!(tenant.options_table(), "wp_7_options");
        assert_eq!(tenant.users_table(), "wp_users");
        assert_eq!(tenant.usermeta_table(), "wp_usermeta");
        assert_eq!(tenant.capabilities_key(), "wp_7_capabilities");
        assert_eq!(tenant.user_roles_option(), "wp_7_user_roles");
    }

    #[test]
    fn rejects_unsafe_prefixes() {
        for prefix in ["", "wp-", "wp_;drop", "wp `x`", "préfix_"] {
            assert!(
                matches!(SiteScope::new(prefix, 1), Err(StoreError::InvalidPrefix(_))),
                "{prefix:?} should be rejected"
            );
        }
        assert!(SiteScope::new("Site_2", 3).is_ok());
    }

    #[test]
    fn first_row_wins() {
        let map = first_wins(vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
            ("a".to_string(), Value::Int(3)),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
    }
}
