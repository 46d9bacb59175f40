use crate::{
    auth::{
        capabilities::resolve,
        cookie::AuthCookie,
        hash::{constant_time_eq, hash_token, hmac_md5_hex, hmac_sha256_hex, Scheme},
        RequestContext,
    },
    error::Result,
    store::{first_wins, MetaQuery, UserRecord, Value},
};
use indexmap::IndexMap;
use secrecy::ExposeSecret;
use tracing::debug;

const SESSION_TOKENS_KEY: &str = "session_tokens";

/// A user whose auth cookie matched a live session.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentUser {
    pub id: u64,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub nicename: String,
    pub caps: IndexMap<String, bool>,
    pub roles: Vec<String>,
    pub session_expiration: i64,
}

impl CurrentUser {
    #[must_use]
    pub fn has_cap(&self, cap: &str) -> bool {
        self.caps.get(cap).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Four characters of the stored password hash mixed into the cookie key.
///
/// Portable (`$P$`) and bcrypt (`$2y$`) hashes contribute bytes 8..12,
/// every other format its last four bytes.
fn pass_frag(pass_hash: &str) -> String {
    let bytes = pass_hash.as_bytes();
    let frag = if pass_hash.starts_with("$P$") || pass_hash.starts_with("$2y$") {
        bytes.get(8..bytes.len().min(12)).unwrap_or_default()
    } else {
        &bytes[bytes.len().saturating_sub(4)..]
    };
    String::from_utf8_lossy(frag).into_owned()
}

/// MAC an auth cookie must carry, given the user's stored password hash
/// and the `Scheme::Auth` key material.
///
/// # Errors
/// Returns an error if a MAC cannot be keyed.
pub fn cookie_mac(cookie: &AuthCookie, pass_hash: &str, auth_key: &str) -> Result<String> {
    let key = hmac_md5_hex(
        format!(
            "{}|{}|{}|{}",
            cookie.login,
            pass_frag(pass_hash),
            cookie.expiration,
            cookie.token
        )
        .as_bytes(),
        auth_key.as_bytes(),
    )?;
    hmac_sha256_hex(
        format!("{}|{}|{}", cookie.login, cookie.expiration, cookie.token).as_bytes(),
        key.as_bytes(),
    )
}

impl RequestContext<'_> {
    async fn cookie_mac_matches(&mut self, user: &UserRecord, cookie: &AuthCookie) -> Result<bool> {
        let key = self.scheme_key(Scheme::Auth).await?;
        let expected = cookie_mac(cookie, user.pass_hash.expose_secret(), key.expose_secret())?;
        Ok(constant_time_eq(expected.as_bytes(), cookie.mac.as_bytes()))
    }

    /// Verify the auth cookie against the user's stored sessions.
    ///
    /// Every authentication failure is `Ok(None)`; errors are reserved for
    /// store and decode failures.
    ///
    /// # Errors
    /// Returns an error if the store fails or a stored value is corrupt.
    pub async fn current_user(&mut self) -> Result<Option<CurrentUser>> {
        let now = self.now.timestamp();

        let Some(raw) = self.auth_cookie().await? else {
            return Ok(None);
        };

        let Some(cookie) = AuthCookie::parse(&raw) else {
            debug!(step = "cookie_format", "auth cookie does not have four fields");
            return Ok(None);
        };

        let Some(expires_at) = cookie.expires_at() else {
            debug!(step = "cookie_format", "auth cookie expiration is not an integer");
            return Ok(None);
        };

        if expires_at < now {
            debug!(step = "cookie_expiration", expires_at, "auth cookie expired");
            return Ok(None);
        }

        let Some(user) = self
            .store
            .find_user_by_login(&self.scope, &cookie.login)
            .await?
        else {
            debug!(step = "user", login = %cookie.login, "unknown user");
            return Ok(None);
        };

        let capabilities_key = self.scope.capabilities_key();
        let keys = [SESSION_TOKENS_KEY.to_string(), capabilities_key.clone()];
        let meta = first_wins(
            self.store
                .load_user_meta(&self.scope, user.id, MetaQuery::Keys(&keys))
                .await?,
        );

        let Some(sessions) = meta.get(SESSION_TOKENS_KEY).and_then(Value::to_map) else {
            debug!(step = "sessions", user_id = user.id, "no session collection");
            return Ok(None);
        };

        let verifier = hash_token(&cookie.token, self.settings.verifier_hash());
        let Some(session) = sessions.get(&verifier) else {
            debug!(step = "verifier", user_id = user.id, "session not found");
            return Ok(None);
        };

        let Some(session_expiration) = session.get("expiration").and_then(Value::as_i64) else {
            debug!(step = "session_expiration", user_id = user.id, "session has no expiration");
            return Ok(None);
        };

        if session_expiration < now {
            debug!(step = "session_expiration", user_id = user.id, "session expired");
            return Ok(None);
        }

        if self.settings.verify_cookie_mac() && !self.cookie_mac_matches(&user, &cookie).await? {
            debug!(step = "cookie_mac", user_id = user.id, "auth cookie MAC mismatch");
            return Ok(None);
        }

        let roles_option = self.scope.user_roles_option();
        let role_caps = self
            .get_option(&roles_option, Value::Null)
            .await?
            .to_map()
            .unwrap_or_default();
        let user_caps = meta
            .get(&capabilities_key)
            .and_then(Value::to_map)
            .unwrap_or_default();
        let (caps, roles) = resolve(&user_caps, &role_caps);

        debug!(user_id = user.id, roles = ?roles, "session verified");

        let current = CurrentUser {
            id: user.id,
            login: user.login,
            email: user.email,
            display_name: user.display_name,
            nicename: user.nicename,
            caps,
            roles,
            session_expiration,
        };

        Ok(Some(self.settings.hooks().current_user(current)))
    }
}
