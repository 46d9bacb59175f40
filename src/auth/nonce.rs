use crate::{
    auth::{hash::constant_time_eq, settings::DEFAULT_NONCE_LIFE_SECONDS, RequestContext, Scheme},
    error::Result,
};
use tracing::{debug, warn};

/// Which window a verified nonce was issued in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceAge {
    /// Issued during the current tick.
    Current,
    /// Issued during the previous tick.
    Previous,
}

/// Half-lifetime bucket containing `now`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn tick(now: i64, nonce_life: i64) -> i64 {
    let half = nonce_life as f64 / 2.0;
    (now as f64 / half).ceil() as i64
}

/// Ten characters ending two before the end of a hex digest.
#[must_use]
pub fn nonce_from_digest(digest: &str) -> String {
    let start = digest.len().saturating_sub(12);
    let end = (start + 10).min(digest.len());
    digest.get(start..end).unwrap_or_default().to_string()
}

impl RequestContext<'_> {
    fn nonce_life(&self, action: &str) -> i64 {
        let life = self
            .settings
            .hooks()
            .nonce_life(action, self.settings.nonce_life_seconds());
        if life > 0 {
            life
        } else {
            warn!(action, life, "ignoring non-positive nonce life");
            DEFAULT_NONCE_LIFE_SECONDS
        }
    }

    #[must_use]
    pub fn nonce_tick(&self, action: &str) -> i64 {
        tick(self.now.timestamp(), self.nonce_life(action))
    }

    fn nonce_uid(&self, action: &str, uid: u64) -> String {
        if uid == 0 {
            self.settings.hooks().logged_out_uid(uid, action)
        } else {
            uid.to_string()
        }
    }

    async fn nonce_at(&mut self, tick: i64, action: &str, uid: &str) -> Result<String> {
        let token = self.session_token().await?;
        let digest = self
            .hash(&format!("{tick}|{action}|{uid}|{token}"), Scheme::Nonce)
            .await?;
        Ok(nonce_from_digest(&digest))
    }

    /// Token bound to the action, user, session and current tick.
    ///
    /// # Errors
    /// Returns an error if the option store fails.
    pub async fn create_nonce(&mut self, action: &str, uid: u64) -> Result<String> {
        let tick = self.nonce_tick(action);
        let uid = self.nonce_uid(action, uid);
        self.nonce_at(tick, action, &uid).await
    }

    /// Check a nonce against the current and previous ticks.
    ///
    /// # Errors
    /// Returns an error if the option store fails.
    pub async fn verify_nonce(
        &mut self,
        nonce: &str,
        action: &str,
        uid: u64,
    ) -> Result<Option<NonceAge>> {
        if nonce.is_empty() {
            return Ok(None);
        }

        let tick = self.nonce_tick(action);
        let uid = self.nonce_uid(action, uid);

        for (offset, age) in [(0, NonceAge::Current), (1, NonceAge::Previous)] {
            let expected = self.nonce_at(tick - offset, action, &uid).await?;
            if constant_time_eq(expected.as_bytes(), nonce.as_bytes()) {
                return Ok(Some(age));
            }
        }

        debug!(action, "nonce rejected");
        Ok(None)
    }
}
