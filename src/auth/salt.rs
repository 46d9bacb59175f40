use crate::{
    auth::{hash::hmac_md5_hex, RequestContext},
    error::Result,
    store::Value,
};
use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Days of salts kept before today.
pub const SALT_KEEP_DAYS: i64 = 2;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Drop entries dated before `today - SALT_KEEP_DAYS`, after `today`, or
/// with keys that are not dates. Returns whether anything was removed.
pub fn prune_salts(salts: &mut IndexMap<String, Value>, today: NaiveDate) -> bool {
    let oldest = today - Duration::days(SALT_KEEP_DAYS);
    let before = salts.len();
    salts.retain(|date, _| {
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .is_ok_and(|date| date >= oldest && date <= today)
    });
    salts.len() != before
}

fn fresh_salt() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

impl RequestContext<'_> {
    /// Salt for today's UTC date, created on first use.
    ///
    /// The salt table is written at most once per call, and only when an
    /// entry was added or pruned.
    ///
    /// # Errors
    /// Returns an error if the store or the OS random source fails.
    pub async fn daily_salt(&mut self) -> Result<SecretString> {
        let option = self.settings.salt_option().to_string();
        let mut salts = self
            .get_option(&option, Value::Null)
            .await?
            .to_map()
            .unwrap_or_default();

        let today = self.now.date_naive();
        let key = today.format(DATE_FORMAT).to_string();

        let mut changed = false;
        let salt = if let Some(existing) = salts.get(&key).and_then(Value::as_str) {
            existing.to_string()
        } else {
            let created = fresh_salt()?;
            salts.insert(key, Value::from(created.as_str()));
            changed = true;
            created
        };

        if prune_salts(&mut salts, today) {
            changed = true;
        }

        if changed {
            debug!(entries = salts.len(), "persisting salt table");
            self.update_option(&option, Value::Map(salts), false).await?;
        }

        Ok(SecretString::from(salt))
    }

    /// Anonymous per-day tag for a user.
    ///
    /// # Errors
    /// Returns an error if the salt cannot be loaded or created.
    pub async fn fingerprint(&mut self, user_id: u64) -> Result<String> {
        let salt = self.daily_salt().await?;
        hmac_md5_hex(
            user_id.to_string().as_bytes(),
            salt.expose_secret().as_bytes(),
        )
    }
}
