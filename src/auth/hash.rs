use crate::{
    auth::{settings::VerifierHash, RequestContext},
    error::{Result, StoreError},
    store::Value,
};
use hmac::{Hmac, Mac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::{Digest, Sha256};

type HmacMd5 = Hmac<Md5>;
type HmacSha256 = Hmac<Sha256>;

/// Key material used by [`RequestContext::hash`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// `logged_in_key` followed by `logged_in_salt`.
    Auth,
    /// `nonce_key` followed by `nonce_salt`.
    Nonce,
}

impl Scheme {
    const fn names(self) -> (&'static str, &'static str) {
        match self {
            Self::Auth => ("logged_in_key", "logged_in_salt"),
            Self::Nonce => ("nonce_key", "nonce_salt"),
        }
    }
}

#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Session verifier for a cookie token.
#[must_use]
pub fn hash_token(token: &str, hash: VerifierHash) -> String {
    match hash {
        VerifierHash::Sha256 => hex::encode(Sha256::digest(token.as_bytes())),
        VerifierHash::Sha1 => hex::encode(Sha1::digest(token.as_bytes())),
    }
}

/// # Errors
/// Returns [`StoreError::Hash`] if the MAC cannot be keyed.
pub fn hmac_md5_hex(data: &[u8], key: &[u8]) -> Result<String> {
    let Ok(mut mac) = HmacMd5::new_from_slice(key) else {
        return Err(StoreError::Hash);
    };
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// # Errors
/// Returns [`StoreError::Hash`] if the MAC cannot be keyed.
pub fn hmac_sha256_hex(data: &[u8], key: &[u8]) -> Result<String> {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return Err(StoreError::Hash);
    };
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare without short-circuiting on the first differing byte.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

impl RequestContext<'_> {
    /// Configured secret, or the option of the same name.
    async fn secret(&mut self, configured: Option<SecretString>, name: &str) -> Result<SecretString> {
        if let Some(secret) = configured {
            return Ok(secret);
        }
        let value = self.get_option(name, Value::from("")).await?;
        Ok(SecretString::from(value.as_str().unwrap_or_default()))
    }

    pub(crate) async fn scheme_key(&mut self, scheme: Scheme) -> Result<SecretString> {
        let (key_name, salt_name) = scheme.names();
        let (key, salt) = match scheme {
            Scheme::Auth => (
                self.settings.logged_in_key().cloned(),
                self.settings.logged_in_salt().cloned(),
            ),
            Scheme::Nonce => (
                self.settings.nonce_key().cloned(),
                self.settings.nonce_salt().cloned(),
            ),
        };
        let key = self.secret(key, key_name).await?;
        let salt = self.secret(salt, salt_name).await?;
        let material = format!("{}{}", key.expose_secret(), salt.expose_secret());
        if material.is_empty() {
            return Err(StoreError::MissingKey(key_name.to_string()));
        }
        Ok(SecretString::from(material))
    }

    /// Keyed MD5 of `data` under the scheme's key material.
    ///
    /// # Errors
    /// Returns an error if the option store fails or neither the key nor the
    /// salt is set.
    pub async fn hash(&mut self, data: &str, scheme: Scheme) -> Result<String> {
        let key = self.scheme_key(scheme).await?;
        hmac_md5_hex(data.as_bytes(), key.expose_secret().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{CookieJar, Settings},
        store::{MemoryStore, SiteScope},
    };

    #[test]
    fn digests_match_known_vectors() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            hash_token("abc", VerifierHash::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hash_token("abc", VerifierHash::Sha1),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn hmac_known_vectors() {
        // RFC 2202 / RFC 4231 test case 2
        assert_eq!(
            hmac_md5_hex(b"what do ya want for nothing?", b"Jefe").ok(),
            Some("750c783e6ab0b503eaa86e310a5db738".to_string())
        );
        assert_eq!(
            hmac_sha256_hex(b"what do ya want for nothing?", b"Jefe").ok(),
            Some("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843".to_string())
        );
        assert!(hmac_md5_hex(b"data", b"").is_ok());
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn empty_key_material_is_an_error() {
        let store = MemoryStore::new();
        let scope = SiteScope::new("wp_", 1).expect("valid prefix");
        let settings = Settings::new(scope.clone());

        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        assert!(matches!(
            ctx.hash("data", Scheme::Nonce).await,
            Err(StoreError::MissingKey(name)) if name == "nonce_key"
        ));
        assert!(matches!(
            ctx.create_nonce("refresh", 0).await,
            Err(StoreError::MissingKey(_))
        ));

        // A salt stored as an option is enough key material.
        store
            .insert_option(&scope, "nonce_salt", &Value::from("stored-salt"))
            .expect("seed");
        let mut ctx = RequestContext::new(&store, &settings, CookieJar::default());
        assert!(ctx.hash("data", Scheme::Nonce).await.is_ok());
        assert!(matches!(
            ctx.hash("data", Scheme::Auth).await,
            Err(StoreError::MissingKey(name)) if name == "logged_in_key"
        ));
    }
}
