use crate::auth::settings::{
    VerifierHash, DEFAULT_COOKIE_PREFIX, DEFAULT_NONCE_ACTION, DEFAULT_NONCE_LIFE_SECONDS,
    DEFAULT_SALT_OPTION,
};
use anyhow::{anyhow, Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub table_prefix: String,
    pub blog_id: u64,
    pub cookie_prefix: String,
    pub nonce_life_seconds: i64,
    pub nonce_action: String,
    pub salt_option: String,
    pub verifier_hash: VerifierHash,
    pub verify_cookie_mac: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if an argument is missing or cannot be parsed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let string = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        let verifier_hash = string("verifier-hash")?
            .parse::<VerifierHash>()
            .map_err(|err| anyhow!(err))?;

        Ok(Self {
            table_prefix: string("table-prefix")?,
            blog_id: matches.get_one::<u64>("blog-id").copied().unwrap_or(1),
            cookie_prefix: string("cookie-prefix")?,
            nonce_life_seconds: matches
                .get_one::<i64>("nonce-life")
                .copied()
                .unwrap_or(DEFAULT_NONCE_LIFE_SECONDS),
            nonce_action: string("nonce-action")?,
            salt_option: string("salt-option")?,
            verifier_hash,
            verify_cookie_mac: matches.get_flag("verify-cookie-mac"),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("table-prefix")
                .long("table-prefix")
                .help("Base table prefix, letters, digits and underscores only")
                .env("SESSIONGATE_TABLE_PREFIX")
                .default_value("wp_"),
        )
        .arg(
            Arg::new("blog-id")
                .long("blog-id")
                .help("Site id inside a multisite network")
                .env("SESSIONGATE_BLOG_ID")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("cookie-prefix")
                .long("cookie-prefix")
                .help("Auth cookie name prefix, the site URL hash is appended")
                .env("SESSIONGATE_COOKIE_PREFIX")
                .default_value(DEFAULT_COOKIE_PREFIX),
        )
        .arg(
            Arg::new("nonce-life")
                .long("nonce-life")
                .help("Nonce lifetime in seconds")
                .env("SESSIONGATE_NONCE_LIFE")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("nonce-action")
                .long("nonce-action")
                .help("Action bound to nonces issued by the auth endpoint")
                .env("SESSIONGATE_NONCE_ACTION")
                .default_value(DEFAULT_NONCE_ACTION),
        )
        .arg(
            Arg::new("salt-option")
                .long("salt-option")
                .help("Option holding the daily fingerprint salts")
                .env("SESSIONGATE_SALT_OPTION")
                .default_value(DEFAULT_SALT_OPTION),
        )
        .arg(
            Arg::new("verifier-hash")
                .long("verifier-hash")
                .help("Digest of session tokens in the session collection")
                .env("SESSIONGATE_VERIFIER_HASH")
                .default_value("sha256")
                .value_parser(["sha256", "sha1"]),
        )
        .arg(
            Arg::new("verify-cookie-mac")
                .long("verify-cookie-mac")
                .help("Also check the MAC field of the auth cookie")
                .env("SESSIONGATE_VERIFY_COOKIE_MAC")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
