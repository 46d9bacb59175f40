use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

const KEYS: [(&str, &str, &str); 4] = [
    (
        "logged-in-key",
        "SESSIONGATE_LOGGED_IN_KEY",
        "Key for auth cookie MACs, read from the options table when unset",
    ),
    (
        "logged-in-salt",
        "SESSIONGATE_LOGGED_IN_SALT",
        "Salt for auth cookie MACs, read from the options table when unset",
    ),
    (
        "nonce-key",
        "SESSIONGATE_NONCE_KEY",
        "Key for nonces, read from the options table when unset",
    ),
    (
        "nonce-salt",
        "SESSIONGATE_NONCE_SALT",
        "Salt for nonces, read from the options table when unset",
    ),
];

/// Secret key material given on the command line or in the environment.
#[derive(Debug, Default)]
pub struct Keys {
    pub logged_in_key: Option<SecretString>,
    pub logged_in_salt: Option<SecretString>,
    pub nonce_key: Option<SecretString>,
    pub nonce_salt: Option<SecretString>,
}

impl Keys {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let secret = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| SecretString::from(value.as_str()))
        };

        Self {
            logged_in_key: secret("logged-in-key"),
            logged_in_salt: secret("logged-in-salt"),
            nonce_key: secret("nonce-key"),
            nonce_salt: secret("nonce-salt"),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    KEYS.iter().fold(command, |command, (id, env, help)| {
        command.arg(
            Arg::new(*id)
                .long(*id)
                .help(*help)
                .env(*env)
                .hide_env_values(true),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn keys_from_env_stay_secret() {
        temp_env::with_vars(
            [
                ("SESSIONGATE_NONCE_KEY", Some("nk")),
                ("SESSIONGATE_NONCE_SALT", Some("ns")),
                ("SESSIONGATE_LOGGED_IN_KEY", None),
                ("SESSIONGATE_LOGGED_IN_SALT", None),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
                let keys = Keys::parse(&matches);
                assert_eq!(keys.nonce_key.as_ref().map(|k| k.expose_secret()), Some("nk"));
                assert_eq!(keys.nonce_salt.as_ref().map(|k| k.expose_secret()), Some("ns"));
                assert!(keys.logged_in_key.is_none());
                assert!(!format!("{keys:?}").contains("nk"));
            },
        );
    }
}
