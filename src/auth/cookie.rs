use crate::{
    auth::{hash::md5_hex, RequestContext},
    error::Result,
    store::Value,
};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

/// Cookies sent with one request, decoded.
#[derive(Clone, Default)]
pub struct CookieJar {
    cookies: IndexMap<String, String>,
}

impl CookieJar {
    /// Parse any number of `Cookie` header values. When a name repeats,
    /// the first occurrence wins.
    pub fn parse<'h>(headers: impl IntoIterator<Item = &'h str>) -> Self {
        let mut cookies = IndexMap::new();
        for header in headers {
            for pair in header.split(';') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                cookies
                    .entry(name.to_string())
                    .or_insert_with(|| decode_value(value.trim()));
            }
        }
        Self { cookies }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

// Cookie values carry credentials; only names are printed.
impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.cookies.keys()).finish()
    }
}

/// Form decoding: `+` is a space, then percent escapes.
fn decode_value(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// Cookie name suffix for a site URL.
#[must_use]
pub fn cookie_hash(site_url: &str) -> String {
    md5_hex(normalize_site_url(site_url).as_bytes())
}

fn normalize_site_url(site_url: &str) -> String {
    site_url.to_lowercase().trim_end_matches('/').to_string()
}

/// The four `|`-separated fields of an auth cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCookie {
    pub login: String,
    pub expiration: String,
    pub token: String,
    pub mac: String,
}

impl AuthCookie {
    /// `None` unless the value has exactly four fields.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.split('|');
        let cookie = Self {
            login: fields.next()?.to_string(),
            expiration: fields.next()?.to_string(),
            token: fields.next()?.to_string(),
            mac: fields.next()?.to_string(),
        };
        if fields.next().is_some() {
            return None;
        }
        Some(cookie)
    }

    /// Expiration as a unix timestamp, when it is an integer.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        Value::from(self.expiration.as_str()).as_i64()
    }
}

impl fmt::Debug for AuthCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCookie")
            .field("login", &self.login)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl RequestContext<'_> {
    /// Name of the auth cookie for the current site.
    ///
    /// # Errors
    /// Returns an error if the option store fails.
    pub async fn auth_cookie_name(&mut self) -> Result<String> {
        let site_url = self.get_option("siteurl", Value::from("")).await?;
        let site_url = normalize_site_url(site_url.as_str().unwrap_or_default());
        let hash = self
            .settings
            .hooks()
            .cookie_hash(md5_hex(site_url.as_bytes()), &site_url);
        Ok(format!("{}_{hash}", self.settings.cookie_prefix()))
    }

    /// Raw auth cookie value. Computed once per request, whether or not it
    /// is present.
    ///
    /// # Errors
    /// Returns an error if the option store fails.
    pub async fn auth_cookie(&mut self) -> Result<Option<String>> {
        if let Some(cached) = &self.auth_cookie {
            return Ok(cached.clone());
        }

        let name = self.auth_cookie_name().await?;
        let cookie = self.cookies.get(&name).map(str::to_string);
        if cookie.is_none() {
            debug!(cookie = %name, "auth cookie not present");
        }
        self.auth_cookie = Some(cookie.clone());
        Ok(cookie)
    }

    /// Third cookie field, or an empty string.
    ///
    /// # Errors
    /// Returns an error if the option store fails.
    pub async fn session_token(&mut self) -> Result<String> {
        Ok(self
            .auth_cookie()
            .await?
            .and_then(|cookie| cookie.split('|').nth(2).map(str::to_string))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_decodes_form_encoding() {
        let jar = CookieJar::parse(["a=one+two%7Cthree; b = %E2%9C%93 ;broken; =x"]);
        assert_eq!(jar.get("a"), Some("one two|three"));
        assert_eq!(jar.get("b"), Some("✓"));
        assert_eq!(jar.len(), 2);
    }

    #[test]
    fn jar_keeps_first_duplicate() {
        let jar = CookieJar::parse(["a=1; a=2", "a=3; c=4"]);
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("c"), Some("4"));
    }

    #[test]
    fn jar_debug_hides_values() {
        let jar = CookieJar::parse(["session=secret-token"]);
        let debug = format!("{jar:?}");
        assert!(debug.contains("session"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn cookie_hash_normalizes_url() {
        let expected = md5_hex(b"https://example.com");
        assert_eq!(cookie_hash("https://Example.com/"), expected);
        assert_eq!(cookie_hash("https://example.com//"), expected);
        assert_eq!(cookie_hash("https://example.com"), expected);
    }

    #[test]
    fn auth_cookie_needs_four_fields() {
        let cookie = AuthCookie::parse("alice|9999999999|tok123|macXXXX").expect("four fields");
        assert_eq!(cookie.login, "alice");
        assert_eq!(cookie.token, "tok123");
        assert_eq!(cookie.expires_at(), Some(9_999_999_999));

        assert!(AuthCookie::parse("").is_none());
        assert!(AuthCookie::parse("alice|9999999999|tok123").is_none());
        assert!(AuthCookie::parse("alice|9999999999|tok123|mac|extra").is_none());
        assert_eq!(
            AuthCookie::parse("alice|soon|tok|mac").and_then(|c| c.expires_at()),
            None
        );
    }
}
