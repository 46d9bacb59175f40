use crate::{
    error::{Result, StoreError},
    store::{php, MetaQuery, SiteScope, Store, StoreFuture, UserRecord, Value},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

#[derive(Debug, Default)]
struct Tables {
    // table name -> option name -> (raw value, autoload)
    options: HashMap<String, HashMap<String, (String, bool)>>,
    users: Vec<(String, UserRecord)>,
    // (umeta_id, table, user_id, key, raw value)
    meta: Vec<(u64, String, u64, String, String)>,
    next_meta_id: u64,
}

/// In-process [`Store`] holding rows in their serialized storage form.
///
/// Round trips are counted per table so callers can observe caching.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    option_queries: AtomicUsize,
    option_writes: AtomicUsize,
    user_queries: AtomicUsize,
    meta_queries: AtomicUsize,
    meta_writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed an option in its storage form.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn insert_option(&self, scope: &SiteScope, name: &str, value: &Value) -> Result<()> {
        self.insert_raw_option(scope, name, &php::maybe_serialize(value))
    }

    /// Seed an option with an arbitrary stored string.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn insert_raw_option(&self, scope: &SiteScope, name: &str, raw: &str) -> Result<()> {
        self.tables()?
            .options
            .entry(scope.options_table())
            .or_default()
            .insert(name.to_string(), (raw.to_string(), true));
        Ok(())
    }

    /// Current decoded value of an option, without counting a round trip.
    ///
    /// # Errors
    /// Returns an error if the lock is poisoned or the stored value is corrupt.
    pub fn option(&self, scope: &SiteScope, name: &str) -> Result<Option<Value>> {
        let tables = self.tables()?;
        tables
            .options
            .get(&scope.options_table())
            .and_then(|table| table.get(name))
            .map(|(raw, _)| {
                php::maybe_unserialize(raw).map_err(|err| StoreError::decode(name, err))
            })
            .transpose()
    }

    /// Seed a user row.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn insert_user(&self, scope: &SiteScope, user: UserRecord) -> Result<()> {
        self.tables()?.users.push((scope.users_table(), user));
        Ok(())
    }

    /// Append a meta row, even if the key already exists for the user.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn insert_user_meta(
        &self,
        scope: &SiteScope,
        user_id: u64,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        let mut tables = self.tables()?;
        tables.next_meta_id += 1;
        let id = tables.next_meta_id;
        tables.meta.push((
            id,
            scope.usermeta_table(),
            user_id,
            key.to_string(),
            php::maybe_serialize(value),
        ));
        Ok(())
    }

    #[must_use]
    pub fn option_queries(&self) -> usize {
        self.option_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn option_writes(&self) -> usize {
        self.option_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn user_queries(&self) -> usize {
        self.user_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn meta_queries(&self) -> usize {
        self.meta_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn meta_writes(&self) -> usize {
        self.meta_writes.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn load_options<'a>(
        &'a self,
        scope: &'a SiteScope,
        names: &'a [String],
    ) -> StoreFuture<'a, Vec<(String, Value)>> {
        Box::pin(async move {
            self.check_available()?;
            self.option_queries.fetch_add(1, Ordering::SeqCst);

            let raw: Vec<(String, String)> = {
                let tables = self.tables()?;
                let Some(table) = tables.options.get(&scope.options_table()) else {
                    return Ok(Vec::new());
                };
                names
                    .iter()
                    .filter_map(|name| table.get(name).map(|(raw, _)| (name.clone(), raw.clone())))
                    .collect()
            };

            raw.into_iter()
                .map(|(name, raw)| {
                    let value = php::maybe_unserialize(&raw)
                        .map_err(|err| StoreError::decode(format!("option {name}"), err))?;
                    Ok((name, value))
                })
                .collect()
        })
    }

    fn upsert_option<'a>(
        &'a self,
        scope: &'a SiteScope,
        name: &'a str,
        value: &'a Value,
        autoload: bool,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.option_writes.fetch_add(1, Ordering::SeqCst);
            self.tables()?
                .options
                .entry(scope.options_table())
                .or_default()
                .insert(name.to_string(), (php::maybe_serialize(value), autoload));
            Ok(())
        })
    }

    fn find_user_by_login<'a>(
        &'a self,
        scope: &'a SiteScope,
        login: &'a str,
    ) -> StoreFuture<'a, Option<UserRecord>> {
        Box::pin(async move {
            self.check_available()?;
            self.user_queries.fetch_add(1, Ordering::SeqCst);
            let table = scope.users_table();
            Ok(self
                .tables()?
                .users
                .iter()
                .find(|(users, user)| *users == table && user.login == login)
                .map(|(_, user)| user.clone()))
        })
    }

    fn load_user_meta<'a>(
        &'a self,
        scope: &'a SiteScope,
        user_id: u64,
        query: MetaQuery<'a>,
    ) -> StoreFuture<'a, Vec<(String, Value)>> {
        Box::pin(async move {
            self.check_available()?;
            self.meta_queries.fetch_add(1, Ordering::SeqCst);
            let table = scope.usermeta_table();

            let raw: Vec<(String, String)> = self
                .tables()?
                .meta
                .iter()
                .filter(|(_, meta_table, owner, key, _)| {
                    *meta_table == table
                        && *owner == user_id
                        && match query {
                            MetaQuery::Keys(keys) => keys.iter().any(|k| k == key),
                            MetaQuery::Containing(filter) => key.contains(filter),
                            MetaQuery::All => true,
                        }
                })
                .map(|(_, _, _, key, raw)| (key.clone(), raw.clone()))
                .collect();

            raw.into_iter()
                .map(|(key, raw)| {
                    let value = php::maybe_unserialize(&raw)
                        .map_err(|err| StoreError::decode(format!("user meta {key}"), err))?;
                    Ok((key, value))
                })
                .collect()
        })
    }

    fn upsert_user_meta<'a>(
        &'a self,
        scope: &'a SiteScope,
        user_id: u64,
        key: &'a str,
        value: &'a Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.meta_writes.fetch_add(1, Ordering::SeqCst);
            let table = scope.usermeta_table();
            let stored = php::maybe_serialize(value);

            let mut tables = self.tables()?;
            let existing = tables
                .meta
                .iter_mut()
                .find(|(_, meta_table, owner, meta_key, _)| {
                    *meta_table == table && *owner == user_id && meta_key == key
                });
            if let Some(row) = existing {
                row.4 = stored;
            } else {
                tables.next_meta_id += 1;
                let id = tables.next_meta_id;
                tables
                    .meta
                    .push((id, table, user_id, key.to_string(), stored));
            }
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.check_available() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> SiteScope {
        SiteScope::new("wp_", 1).expect("valid prefix")
    }

    #[tokio::test]
    async fn options_round_trip_through_storage_form() {
        let store = MemoryStore::new();
        let scope = scope();
        let roles = Value::from_iter([("editor", Value::from_iter([("name", Value::from("Editor"))]))]);
        store.upsert_option(&scope, "wp_user_roles", &roles, true).await.expect("write");

        let names = vec!["wp_user_roles".to_string(), "missing".to_string()];
        let loaded = store.load_options(&scope, &names).await.expect("read");
        assert_eq!(loaded, vec![("wp_user_roles".to_string(), roles)]);
        assert_eq!(store.option_queries(), 1);
        assert_eq!(store.option_writes(), 1);
    }

    #[tokio::test]
    async fn options_are_scoped_per_tenant() {
        let store = MemoryStore::new();
        let scope = scope();
        store.insert_option(&scope, "blogname", &Value::from("Main")).expect("seed");
        let names = vec!["blogname".to_string()];
        let tenant = scope.with_blog_id(2);
        assert!(store.load_options(&tenant, &names).await.expect("read").is_empty());
    }

    #[tokio::test]
    async fn corrupt_rows_surface_as_decode_errors() {
        let store = MemoryStore::new();
        let scope = scope();
        store.insert_raw_option(&scope, "cron", "a:1:{broken}").expect("seed");
        let names = vec!["cron".to_string()];
        let result = store.load_options(&scope, &names).await;
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn meta_upsert_updates_first_matching_row() {
        let store = MemoryStore::new();
        let scope = scope();
        store.insert_user_meta(&scope, 5, "color", &Value::from("red")).expect("seed");
        store.insert_user_meta(&scope, 5, "color", &Value::from("blue")).expect("seed");
        store.upsert_user_meta(&scope, 5, "color", &Value::from("green")).await.expect("write");
        store.upsert_user_meta(&scope, 5, "size", &Value::Int(3)).await.expect("write");

        let rows = store.load_user_meta(&scope, 5, MetaQuery::All).await.expect("read");
        assert_eq!(
            rows,
            vec![
                ("color".to_string(), Value::from("green")),
                ("color".to_string(), Value::from("blue")),
                ("size".to_string(), Value::from("3")),
            ]
        );
        let filtered = store
            .load_user_meta(&scope, 5, MetaQuery::Containing("siz"))
            .await
            .expect("read");
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.find_user_by_login(&scope(), "alice").await.is_err());
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
