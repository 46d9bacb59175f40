use crate::{
    auth::RequestContext,
    error::Result,
    store::{first_wins, MetaQuery, Value},
};
use indexmap::IndexMap;
use tracing::debug;

/// Lowercase and keep only `[a-z0-9_-]`.
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

impl RequestContext<'_> {
    /// Meta of one user, memoized per user id.
    ///
    /// The cached entry is reused unless `reload` is set, or `meta_key` is
    /// given and not in it. `filter` keeps keys containing the substring.
    /// Null values become empty strings.
    ///
    /// # Errors
    /// Returns an error if the store fails or a stored value is corrupt.
    pub async fn load_user_meta(
        &mut self,
        user_id: u64,
        filter: Option<&str>,
        reload: bool,
        meta_key: Option<&str>,
    ) -> Result<&IndexMap<String, Value>> {
        let cached = self.user_meta.get(&user_id).is_some_and(|meta| {
            !reload && meta_key.map_or(true, |key| meta.contains_key(key))
        });

        if !cached {
            let query = match filter {
                Some(filter) if !filter.is_empty() => MetaQuery::Containing(filter),
                _ => MetaQuery::All,
            };
            let rows = self.store.load_user_meta(&self.scope, user_id, query).await?;
            debug!(user_id, rows = rows.len(), "loaded user meta");

            let meta = first_wins(rows)
                .into_iter()
                .map(|(key, value)| {
                    let value = if value.is_null() {
                        Value::from("")
                    } else {
                        value
                    };
                    (key, value)
                })
                .collect();
            self.user_meta.insert(user_id, meta);
        }

        Ok(self.user_meta.entry(user_id).or_default())
    }

    /// One meta value passed through the `user_meta` hook. Missing keys
    /// yield an empty string.
    ///
    /// # Errors
    /// Returns an error if the store fails or a stored value is corrupt.
    pub async fn get_user_meta(
        &mut self,
        user_id: u64,
        key: &str,
        filter: Option<&str>,
    ) -> Result<Value> {
        let value = self
            .load_user_meta(user_id, filter, false, Some(key))
            .await?
            .get(key)
            .cloned()
            .unwrap_or_else(|| Value::from(""));
        Ok(self.settings.hooks().user_meta(value, user_id, key))
    }

    /// Write one meta value under a sanitized key.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn update_user_meta(&mut self, user_id: u64, key: &str, value: Value) -> Result<()> {
        let key = sanitize_key(key);
        let value = self.settings.hooks().update_user_meta(value, user_id, &key);

        self.store
            .upsert_user_meta(&self.scope, user_id, &key, &value)
            .await?;

        if let Some(meta) = self.user_meta.get_mut(&user_id) {
            meta.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{CookieJar, Hooks, Settings},
        store::{MemoryStore, SiteScope},
    };
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings::new(SiteScope::new("wp_", 1).expect("valid prefix"))
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("Last_Login-At"), "last_login-at");
        assert_eq!(sanitize_key("bad key!é"), "badkey");
        assert_eq!(sanitize_key(""), "");
    }

    #[tokio::test]
    async fn cache_is_reused_until_a_key_is_missing() {
        let store = MemoryStore::new();
        let settings = settings();
        let scope = settings.scope().clone();
        store.insert_user_meta(&scope, 3, "nickname", &Value::from("al")).expect("seed");
        store.insert_user_meta(&scope, 3, "nickname", &Value::from("shadowed")).expect("seed");
        store.insert_user_meta(&scope, 3, "empty", &Value::Null).expect("seed");

        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        let meta = ctx.load_user_meta(3, None, false, None).await.expect("load");
        assert_eq!(meta.get("nickname"), Some(&Value::from("al")));
        assert_eq!(meta.get("empty"), Some(&Value::from("")));

        ctx.get_user_meta(3, "nickname", None).await.expect("get");
        assert_eq!(store.meta_queries(), 1);

        let missing = ctx.get_user_meta(3, "locale", None).await.expect("get");
        assert_eq!(missing, Value::from(""));
        assert_eq!(store.meta_queries(), 2);

        ctx.load_user_meta(3, None, true, None).await.expect("reload");
        assert_eq!(store.meta_queries(), 3);
    }

    #[tokio::test]
    async fn filter_restricts_keys() {
        let store = MemoryStore::new();
        let settings = settings();
        let scope = settings.scope().clone();
        store.insert_user_meta(&scope, 4, "wp_capabilities", &Value::from("a")).expect("seed");
        store.insert_user_meta(&scope, 4, "nickname", &Value::from("b")).expect("seed");

        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        let meta = ctx.load_user_meta(4, Some("capab"), false, None).await.expect("load");
        assert_eq!(meta.keys().collect::<Vec<_>>(), vec!["wp_capabilities"]);
    }

    #[tokio::test]
    async fn update_writes_and_refreshes_cache() {
        let store = MemoryStore::new();
        let settings = settings();
        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());

        ctx.load_user_meta(5, None, false, None).await.expect("load");
        ctx.update_user_meta(5, "Last Seen", Value::Int(1_700_000_000))
            .await
            .expect("update");
        ctx.update_user_meta(5, "lastseen", Value::Int(1_700_000_100))
            .await
            .expect("update");
        assert_eq!(store.meta_writes(), 2);

        let value = ctx.get_user_meta(5, "lastseen", None).await.expect("get");
        assert_eq!(value, Value::Int(1_700_000_100));
        assert_eq!(store.meta_queries(), 1);

        let mut fresh = RequestContext::new(&store, &settings, CookieJar::default());
        let meta = fresh.load_user_meta(5, None, false, None).await.expect("load");
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.get("lastseen"), Some(&Value::from("1700000100")));
    }

    struct Upper;

    impl Hooks for Upper {
        fn user_meta(&self, value: Value, _user_id: u64, key: &str) -> Value {
            let upper = value.as_str().map(str::to_uppercase);
            match upper {
                Some(text) if key == "nickname" => Value::from(text),
                _ => value,
            }
        }

        fn update_user_meta(&self, value: Value, _user_id: u64, key: &str) -> Value {
            if key == "locked" {
                Value::Bool(false)
            } else {
                value
            }
        }
    }

    #[tokio::test]
    async fn hooks_filter_reads_and_writes() {
        let store = MemoryStore::new();
        let settings = settings().with_hooks(Arc::new(Upper));
        let scope = settings.scope().clone();
        store.insert_user_meta(&scope, 6, "nickname", &Value::from("al")).expect("seed");

        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        assert_eq!(
            ctx.get_user_meta(6, "nickname", None).await.expect("get"),
            Value::from("AL")
        );

        ctx.update_user_meta(6, "LOCKED", Value::Bool(true)).await.expect("update");
        let meta = ctx.load_user_meta(6, None, true, None).await.expect("reload");
        assert_eq!(meta.get("locked"), Some(&Value::from("")));
    }
}
