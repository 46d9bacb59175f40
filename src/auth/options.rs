use crate::{auth::RequestContext, error::Result, store::Value};
use indexmap::IndexMap;
use tracing::debug;

/// Options loaded with every batch, whether requested or not.
pub const BASELINE_OPTIONS: &[&str] = &[
    "siteurl",
    "home",
    "blogname",
    "blogdescription",
    "users_can_register",
    "admin_email",
    "timezone_string",
    "date_format",
    "time_format",
    "posts_per_page",
    "permalink_structure",
    "upload_path",
    "template",
    "blog_charset",
    "active_plugins",
    "gmt_offset",
    "stylesheet",
    "default_role",
    "avatar_rating",
    "show_avatars",
    "avatar_default",
    "page_for_posts",
    "page_on_front",
    "site_icon",
    "wp_user_roles",
    "cron",
    "nonce_key",
    "nonce_salt",
    "logged_in_key",
    "logged_in_salt",
    "current_theme",
    "show_on_front",
    "blog_public",
    "theme_switched",
];

impl RequestContext<'_> {
    fn baseline_options(&self) -> Vec<String> {
        let mut names: Vec<String> = BASELINE_OPTIONS.iter().map(ToString::to_string).collect();
        names.push(self.scope.user_roles_option());
        names.push(self.settings.salt_option().to_string());
        self.settings.hooks().option_defaults(names)
    }

    /// Load `names` plus the baseline in one round trip and return the cache.
    ///
    /// Cached names are skipped; when nothing is missing the store is not
    /// touched. Names absent from the store resolve to [`Value::Null`].
    ///
    /// # Errors
    /// Returns an error if the store fails or a stored value is corrupt.
    pub async fn load_options(&mut self, names: &[&str]) -> Result<&IndexMap<String, Value>> {
        let mut missing: Vec<String> = Vec::new();
        for name in self
            .baseline_options()
            .into_iter()
            .chain(names.iter().map(ToString::to_string))
        {
            if !self.options.contains_key(&name) && !missing.contains(&name) {
                missing.push(name);
            }
        }

        if !missing.is_empty() {
            debug!(count = missing.len(), "loading options");
            let loaded = self.store.load_options(&self.scope, &missing).await?;
            for (name, value) in loaded {
                self.options.insert(name, value);
            }
            for name in missing {
                self.options.entry(name).or_insert(Value::Null);
            }
        }

        Ok(&self.options)
    }

    /// Cached option value, or `default` when it is missing or null.
    ///
    /// # Errors
    /// Returns an error if the store fails or a stored value is corrupt.
    pub async fn get_option(&mut self, name: &str, default: Value) -> Result<Value> {
        let options = self.load_options(&[name]).await?;
        Ok(match options.get(name) {
            Some(value) if !value.is_null() => value.clone(),
            _ => default,
        })
    }

    /// Insert or replace an option and update the cache. Last writer wins.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn update_option(&mut self, name: &str, value: Value, autoload: bool) -> Result<()> {
        self.store
            .upsert_option(&self.scope, name, &value, autoload)
            .await?;
        self.options.insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        auth::{CookieJar, Hooks, RequestContext, Settings},
        store::{MemoryStore, SiteScope, Value},
    };
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings::new(SiteScope::new("wp_", 1).expect("valid prefix"))
    }

    #[tokio::test]
    async fn baseline_is_loaded_in_one_round_trip() {
        let store = MemoryStore::new();
        let settings = settings();
        store
            .insert_option(settings.scope(), "blogname", &Value::from("Stories"))
            .expect("seed");
        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());

        let options = ctx.load_options(&["custom_option"]).await.expect("load");
        assert_eq!(options.get("blogname"), Some(&Value::from("Stories")));
        assert_eq!(options.get("custom_option"), Some(&Value::Null));
        assert!(options.contains_key("wp_user_roles"));
        assert!(options.contains_key("sessiongate_daily_salt"));

        ctx.load_options(&["siteurl", "custom_option"]).await.expect("load");
        assert_eq!(store.option_queries(), 1);

        ctx.load_options(&["another"]).await.expect("load");
        assert_eq!(store.option_queries(), 2);
    }

    #[tokio::test]
    async fn get_option_falls_back_on_null() {
        let store = MemoryStore::new();
        let settings = settings();
        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        let value = ctx.get_option("missing", Value::Int(9)).await.expect("get");
        assert_eq!(value, Value::Int(9));
    }

    #[tokio::test]
    async fn update_option_writes_through() {
        let store = MemoryStore::new();
        let settings = settings();
        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        ctx.update_option("flag", Value::Bool(true), false).await.expect("update");
        let value = ctx.get_option("flag", Value::Null).await.expect("get");
        assert_eq!(value, Value::Bool(true));
        assert_eq!(store.option_writes(), 1);
        assert_eq!(
            store.option(settings.scope(), "flag").expect("peek"),
            Some(Value::from("1"))
        );
    }

    struct ExtraDefaults;

    impl Hooks for ExtraDefaults {
        fn option_defaults(&self, mut names: Vec<String>) -> Vec<String> {
            names.retain(|name| name != "cron");
            names.push("theme_mods".to_string());
            names
        }
    }

    #[tokio::test]
    async fn baseline_passes_through_hook() {
        let store = MemoryStore::new();
        let settings = settings().with_hooks(Arc::new(ExtraDefaults));
        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        let options = ctx.load_options(&[]).await.expect("load");
        assert!(options.contains_key("theme_mods"));
        assert!(!options.contains_key("cron"));
    }
}
