use crate::{
    auth::Settings,
    cli::{
        actions::{server::Args, Action},
        commands::{keys::Keys, site::Options},
    },
    store::SiteScope,
};
use anyhow::{Context, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let settings = settings(&Options::parse(matches)?, Keys::parse(matches))?;

    Ok(Action::Server(Args {
        port,
        dsn,
        settings,
    }))
}

/// Build request settings from parsed options and key material.
///
/// # Errors
/// Returns an error if the table prefix is invalid.
pub fn settings(options: &Options, keys: Keys) -> Result<Settings> {
    let scope = SiteScope::new(options.table_prefix.as_str(), options.blog_id)
        .context("invalid --table-prefix")?;

    Ok(Settings::new(scope)
        .with_cookie_prefix(options.cookie_prefix.clone())
        .with_nonce_life_seconds(options.nonce_life_seconds)
        .with_nonce_action(options.nonce_action.clone())
        .with_salt_option(options.salt_option.clone())
        .with_verifier_hash(options.verifier_hash)
        .with_verify_cookie_mac(options.verify_cookie_mac)
        .with_logged_in_key(keys.logged_in_key)
        .with_logged_in_salt(keys.logged_in_salt)
        .with_nonce_key(keys.nonce_key)
        .with_nonce_salt(keys.nonce_salt))
}
