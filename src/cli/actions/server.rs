use crate::{api, auth::Settings, cli::telemetry};
use anyhow::Result;
use secrecy::ExposeSecret;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub settings: Settings,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let result = api::new(args.port, args.dsn, args.settings).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let settings = &args.settings;
    let configured = |secret: Option<&secrecy::SecretString>| {
        secret
            .is_some_and(|value| !value.expose_secret().is_empty())
            .to_string()
    };

    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("table_prefix", settings.scope().base_prefix().to_string()),
        ("blog_id", settings.scope().blog_id().to_string()),
        ("cookie_prefix", settings.cookie_prefix().to_string()),
        ("nonce_life", settings.nonce_life_seconds().to_string()),
        ("nonce_action", settings.nonce_action().to_string()),
        ("salt_option", settings.salt_option().to_string()),
        ("verifier_hash", settings.verifier_hash().as_str().to_string()),
        ("verify_cookie_mac", settings.verify_cookie_mac().to_string()),
        ("logged_in_key_set", configured(settings.logged_in_key())),
        ("nonce_key_set", configured(settings.nonce_key())),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} ({})\n\nStartup configuration:",
        crate::APP_USER_AGENT,
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_password_is_redacted() {
        assert_eq!(
            redact_dsn("mysql://user:hunter2@db:3306/site"),
            "mysql://user:REDACTED@db:3306/site"
        );
        assert_eq!(redact_dsn("mysql://db/site"), "mysql://db/site");
        assert_eq!(redact_dsn("::"), "invalid-dsn");
    }

    #[test]
    fn commit_is_shortened() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }
}
