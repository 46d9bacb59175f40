use crate::{
    auth::{cookie::CookieJar, Settings},
    store::{SiteScope, Store, Value},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;

/// State of one request: caches, cookies and the clock.
///
/// Nothing here outlives the request. Operations live in the modules that
/// own them (`options`, `cookie`, `session`, `nonce`, ...), each adding its
/// methods to this type.
pub struct RequestContext<'a> {
    pub(crate) store: &'a dyn Store,
    pub(crate) settings: &'a Settings,
    pub(crate) scope: SiteScope,
    pub(crate) cookies: CookieJar,
    pub(crate) now: DateTime<Utc>,
    pub(crate) options: IndexMap<String, Value>,
    pub(crate) user_meta: HashMap<u64, IndexMap<String, Value>>,
    pub(crate) auth_cookie: Option<Option<String>>,
}

impl<'a> RequestContext<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store, settings: &'a Settings, cookies: CookieJar) -> Self {
        Self {
            store,
            settings,
            scope: settings.scope().clone(),
            cookies,
            now: Utc::now(),
            options: IndexMap::new(),
            user_meta: HashMap::new(),
            auth_cookie: None,
        }
    }

    /// Serve another tenant. Cached options belong to the previous tenant
    /// and are dropped.
    #[must_use]
    pub fn with_blog_id(mut self, blog_id: u64) -> Self {
        self.scope = self.scope.with_blog_id(blog_id);
        self.options.clear();
        self
    }

    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[must_use]
    pub fn scope(&self) -> &SiteScope {
        &self.scope
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.settings
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }
}
