use crate::{
    error::{Result, StoreError},
    store::{php, MetaQuery, SiteScope, Store, StoreFuture, UserRecord, Value},
};
use secrecy::SecretString;
use sqlx::{mysql::MySqlRow, Connection, MySqlPool, Row};
use tracing::{info_span, Instrument};

/// [`Store`] over the host platform's MySQL tables.
#[derive(Clone, Debug)]
pub struct SqlStore {
    pool: MySqlPool,
}

impl SqlStore {
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Escape `%`, `_` and `\` so `text` matches literally inside `LIKE`.
#[must_use]
pub fn esc_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn decode_row(row: &MySqlRow, key_column: &str, context: &str) -> Result<(String, Value)> {
    let key: Option<String> = row.try_get(key_column)?;
    let raw: Option<String> = row.try_get(1)?;
    let key = key.unwrap_or_default();
    let value = match raw {
        Some(raw) => php::maybe_unserialize(&raw)
            .map_err(|err| StoreError::decode(format!("{context} {key}"), err))?,
        None => Value::Null,
    };
    Ok((key, value))
}

impl Store for SqlStore {
    fn load_options<'a>(
        &'a self,
        scope: &'a SiteScope,
        names: &'a [String],
    ) -> StoreFuture<'a, Vec<(String, Value)>> {
        Box::pin(async move {
            if names.is_empty() {
                return Ok(Vec::new());
            }

            let query = format!(
                "SELECT option_name, option_value FROM {} WHERE option_name IN ({})",
                scope.options_table(),
                placeholders(names.len())
            );
            let span = info_span!(
                "db.query",
                db.system = "mysql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );

            let mut statement = sqlx::query(&query);
            for name in names {
                statement = statement.bind(name);
            }
            let rows = statement.fetch_all(&self.pool).instrument(span).await?;

            rows.iter()
                .map(|row| decode_row(row, "option_name", "option"))
                .collect()
        })
    }

    fn upsert_option<'a>(
        &'a self,
        scope: &'a SiteScope,
        name: &'a str,
        value: &'a Value,
        autoload: bool,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = format!(
                "INSERT INTO {} (option_name, option_value, autoload) VALUES (?, ?, ?) \
                 ON DUPLICATE KEY UPDATE option_value = VALUES(option_value), autoload = VALUES(autoload)",
                scope.options_table()
            );
            let span = info_span!(
                "db.query",
                db.system = "mysql",
                db.operation = "INSERT",
                db.statement = query.as_str()
            );

            sqlx::query(&query)
                .bind(name)
                .bind(php::maybe_serialize(value))
                .bind(if autoload { "yes" } else { "no" })
                .execute(&self.pool)
                .instrument(span)
                .await?;

            Ok(())
        })
    }

    fn find_user_by_login<'a>(
        &'a self,
        scope: &'a SiteScope,
        login: &'a str,
    ) -> StoreFuture<'a, Option<UserRecord>> {
        Box::pin(async move {
            let query = format!(
                "SELECT ID, user_login, user_pass, user_email, display_name, user_nicename \
                 FROM {} WHERE user_login = ? LIMIT 1",
                scope.users_table()
            );
            let span = info_span!(
                "db.query",
                db.system = "mysql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );

            let row = sqlx::query(&query)
                .bind(login)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            Ok(Some(UserRecord {
                id: row.try_get("ID")?,
                login: row.try_get("user_login")?,
                pass_hash: SecretString::from(row.try_get::<String, _>("user_pass")?),
                email: row.try_get("user_email")?,
                display_name: row.try_get("display_name")?,
                nicename: row.try_get("user_nicename")?,
            }))
        })
    }

    fn load_user_meta<'a>(
        &'a self,
        scope: &'a SiteScope,
        user_id: u64,
        query: MetaQuery<'a>,
    ) -> StoreFuture<'a, Vec<(String, Value)>> {
        Box::pin(async move {
            let mut sql = format!(
                "SELECT meta_key, meta_value FROM {} WHERE user_id = ?",
                scope.usermeta_table()
            );
            match query {
                MetaQuery::Keys([]) => return Ok(Vec::new()),
                MetaQuery::Keys(keys) => {
                    sql.push_str(&format!(" AND meta_key IN ({})", placeholders(keys.len())));
                }
                MetaQuery::Containing(filter) if !filter.is_empty() => {
                    sql.push_str(" AND meta_key LIKE ?");
                }
                MetaQuery::Containing(_) | MetaQuery::All => {}
            }
            sql.push_str(" ORDER BY umeta_id ASC");

            let span = info_span!(
                "db.query",
                db.system = "mysql",
                db.operation = "SELECT",
                db.statement = sql.as_str()
            );

            let mut statement = sqlx::query(&sql).bind(user_id);
            match query {
                MetaQuery::Keys(keys) => {
                    for key in keys {
                        statement = statement.bind(key);
                    }
                }
                MetaQuery::Containing(filter) if !filter.is_empty() => {
                    statement = statement.bind(format!("%{}%", esc_like(filter)));
                }
                MetaQuery::Containing(_) | MetaQuery::All => {}
            }
            let rows = statement.fetch_all(&self.pool).instrument(span).await?;

            rows.iter()
                .map(|row| decode_row(row, "meta_key", "user meta"))
                .collect()
        })
    }

    fn upsert_user_meta<'a>(
        &'a self,
        scope: &'a SiteScope,
        user_id: u64,
        key: &'a str,
        value: &'a Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let table = scope.usermeta_table();
            let stored = php::maybe_serialize(value);

            let query = format!(
                "SELECT umeta_id FROM {table} WHERE user_id = ? AND meta_key = ? \
                 ORDER BY umeta_id ASC LIMIT 1"
            );
            let span = info_span!(
                "db.query",
                db.system = "mysql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let existing = sqlx::query(&query)
                .bind(user_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;

            if let Some(row) = existing {
                let umeta_id: u64 = row.try_get("umeta_id")?;
                let query = format!("UPDATE {table} SET meta_value = ? WHERE umeta_id = ?");
                let span = info_span!(
                    "db.query",
                    db.system = "mysql",
                    db.operation = "UPDATE",
                    db.statement = query.as_str()
                );
                sqlx::query(&query)
                    .bind(stored)
                    .bind(umeta_id)
                    .execute(&self.pool)
                    .instrument(span)
                    .await?;
            } else {
                let query = format!(
                    "INSERT INTO {table} (user_id, meta_key, meta_value) VALUES (?, ?, ?)"
                );
                let span = info_span!(
                    "db.query",
                    db.system = "mysql",
                    db.operation = "INSERT",
                    db.statement = query.as_str()
                );
                sqlx::query(&query)
                    .bind(user_id)
                    .bind(key)
                    .bind(stored)
                    .execute(&self.pool)
                    .instrument(span)
                    .await?;
            }

            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let acquire_span = info_span!("db.acquire", db.system = "mysql", db.operation = "ACQUIRE");
            let mut conn = self.pool.acquire().instrument(acquire_span).await?;
            let ping_span = info_span!("db.ping", db.system = "mysql", db.operation = "PING");
            conn.ping().instrument(ping_span).await?;
            Ok(())
        })
    }
}
