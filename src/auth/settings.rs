use crate::{
    auth::hooks::{DefaultHooks, Hooks},
    store::SiteScope,
};
use secrecy::SecretString;
use std::{fmt, str::FromStr, sync::Arc};

pub const DEFAULT_COOKIE_PREFIX: &str = "wordpress_logged_in";
pub const DEFAULT_NONCE_LIFE_SECONDS: i64 = 86_400;
pub const DEFAULT_NONCE_ACTION: &str = "sessiongate_nonce";
pub const DEFAULT_SALT_OPTION: &str = "sessiongate_daily_salt";

/// Digest used to derive session verifiers from cookie tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerifierHash {
    #[default]
    Sha256,
    Sha1,
}

impl VerifierHash {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        }
    }
}

impl FromStr for VerifierHash {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            other => Err(format!("unsupported verifier hash: {other}")),
        }
    }
}

/// Immutable per-process configuration shared by every request.
#[derive(Clone)]
pub struct Settings {
    scope: SiteScope,
    cookie_prefix: String,
    nonce_life_seconds: i64,
    nonce_action: String,
    salt_option: String,
    verifier_hash: VerifierHash,
    verify_cookie_mac: bool,
    logged_in_key: Option<SecretString>,
    logged_in_salt: Option<SecretString>,
    nonce_key: Option<SecretString>,
    nonce_salt: Option<SecretString>,
    hooks: Arc<dyn Hooks>,
}

impl Settings {
    #[must_use]
    pub fn new(scope: SiteScope) -> Self {
        Self {
            scope,
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
            nonce_life_seconds: DEFAULT_NONCE_LIFE_SECONDS,
            nonce_action: DEFAULT_NONCE_ACTION.to_string(),
            salt_option: DEFAULT_SALT_OPTION.to_string(),
            verifier_hash: VerifierHash::default(),
            verify_cookie_mac: false,
            logged_in_key: None,
            logged_in_salt: None,
            nonce_key: None,
            nonce_salt: None,
            hooks: Arc::new(DefaultHooks),
        }
    }

    #[must_use]
    pub fn with_cookie_prefix(mut self, prefix: String) -> Self {
        self.cookie_prefix = prefix;
        self
    }

    #[must_use]
    pub fn with_nonce_life_seconds(mut self, seconds: i64) -> Self {
        self.nonce_life_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_nonce_action(mut self, action: String) -> Self {
        self.nonce_action = action;
        self
    }

    #[must_use]
    pub fn with_salt_option(mut self, name: String) -> Self {
        self.salt_option = name;
        self
    }

    #[must_use]
    pub fn with_verifier_hash(mut self, hash: VerifierHash) -> Self {
        self.verifier_hash = hash;
        self
    }

    #[must_use]
    pub fn with_verify_cookie_mac(mut self, enabled: bool) -> Self {
        self.verify_cookie_mac = enabled;
        self
    }

    #[must_use]
    pub fn with_logged_in_key(mut self, key: Option<SecretString>) -> Self {
        self.logged_in_key = key;
        self
    }

    #[must_use]
    pub fn with_logged_in_salt(mut self, salt: Option<SecretString>) -> Self {
        self.logged_in_salt = salt;
        self
    }

    #[must_use]
    pub fn with_nonce_key(mut self, key: Option<SecretString>) -> Self {
        self.nonce_key = key;
        self
    }

    #[must_use]
    pub fn with_nonce_salt(mut self, salt: Option<SecretString>) -> Self {
        self.nonce_salt = salt;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn scope(&self) -> &SiteScope {
        &self.scope
    }

    #[must_use]
    pub fn cookie_prefix(&self) -> &str {
        &self.cookie_prefix
    }

    #[must_use]
    pub fn nonce_life_seconds(&self) -> i64 {
        self.nonce_life_seconds
    }

    #[must_use]
    pub fn nonce_action(&self) -> &str {
        &self.nonce_action
    }

    #[must_use]
    pub fn salt_option(&self) -> &str {
        &self.salt_option
    }

    #[must_use]
    pub fn verifier_hash(&self) -> VerifierHash {
        self.verifier_hash
    }

    #[must_use]
    pub fn verify_cookie_mac(&self) -> bool {
        self.verify_cookie_mac
    }

    #[must_use]
    pub fn logged_in_key(&self) -> Option<&SecretString> {
        self.logged_in_key.as_ref()
    }

    #[must_use]
    pub fn logged_in_salt(&self) -> Option<&SecretString> {
        self.logged_in_salt.as_ref()
    }

    #[must_use]
    pub fn nonce_key(&self) -> Option<&SecretString> {
        self.nonce_key.as_ref()
    }

    #[must_use]
    pub fn nonce_salt(&self) -> Option<&SecretString> {
        self.nonce_salt.as_ref()
    }

    #[must_use]
    pub fn hooks(&self) -> &dyn Hooks {
        self.hooks.as_ref()
    }
}

fn redacted(secret: Option<&SecretString>) -> &'static str {
    if secret.is_some() {
        "[REDACTED]"
    } else {
        "None"
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("scope", &self.scope)
            .field("cookie_prefix", &self.cookie_prefix)
            .field("nonce_life_seconds", &self.nonce_life_seconds)
            .field("nonce_action", &self.nonce_action)
            .field("salt_option", &self.salt_option)
            .field("verifier_hash", &self.verifier_hash)
            .field("verify_cookie_mac", &self.verify_cookie_mac)
            .field("logged_in_key", &redacted(self.logged_in_key.as_ref()))
            .field("logged_in_salt", &redacted(self.logged_in_salt.as_ref()))
            .field("nonce_key", &redacted(self.nonce_key.as_ref()))
            .field("nonce_salt", &redacted(self.nonce_salt.as_ref()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> SiteScope {
        SiteScope::new("wp_", 1).expect("valid prefix")
    }

    #[test]
    fn defaults() {
        let settings = Settings::new(scope());
        assert_eq!(settings.cookie_prefix(), DEFAULT_COOKIE_PREFIX);
        assert_eq!(settings.nonce_life_seconds(), 86_400);
        assert_eq!(settings.salt_option(), DEFAULT_SALT_OPTION);
        assert_eq!(settings.verifier_hash(), VerifierHash::Sha256);
        assert!(!settings.verify_cookie_mac());
        assert!(settings.nonce_key().is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = Settings::new(scope())
            .with_nonce_key(Some(SecretString::from("super-secret-key")))
            .with_nonce_action("refresh".to_string());
        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("refresh"));
    }

    #[test]
    fn verifier_hash_from_str() {
        assert_eq!("SHA1".parse::<VerifierHash>(), Ok(VerifierHash::Sha1));
        assert_eq!("sha256".parse::<VerifierHash>(), Ok(VerifierHash::Sha256));
        assert!("md5".parse::<VerifierHash>().is_err());
        assert_eq!(VerifierHash::Sha1.as_str(), "sha1");
    }
}
