// SQLite-backed LocaleStore: one row per user or guild preference.

use crate::core::i18n::{I18nError, Locale, LocaleStore};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

const USER_SCOPE: &str = "user";
const GUILD_SCOPE: &str = "guild";

pub struct SqliteLocaleStore {
    pool: Pool<Sqlite>,
}

impl SqliteLocaleStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !in_memory && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        // Every connection to `:memory:` opens its own empty database.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&conn_str)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locale_preferences (
                scope TEXT NOT NULL,
                target_id INTEGER NOT NULL,
                locale TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scope, target_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, scope: &str, target_id: u64) -> Result<Option<Locale>, I18nError> {
        let row = sqlx::query(
            "SELECT locale FROM locale_preferences WHERE scope = ? AND target_id = ?",
        )
        .bind(scope)
        .bind(target_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| I18nError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row.get("locale");
                Locale::parse(&raw)
                    .map(Some)
                    .map_err(|e| I18nError::Storage(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, scope: &str, target_id: u64, locale: &Locale) -> Result<(), I18nError> {
        sqlx::query(
            r#"
            INSERT INTO locale_preferences (scope, target_id, locale, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(scope, target_id) DO UPDATE SET
                locale = excluded.locale,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(scope)
        .bind(target_id as i64)
        .bind(locale.as_str())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| I18nError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self, scope: &str, target_id: u64) -> Result<(), I18nError> {
        sqlx::query("DELETE FROM locale_preferences WHERE scope = ? AND target_id = ?")
            .bind(scope)
            .bind(target_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| I18nError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl LocaleStore for SqliteLocaleStore {
    async fn user_locale(&self, user_id: u64) -> Result<Option<Locale>, I18nError> {
        self.get(USER_SCOPE, user_id).await
    }

    async fn set_user_locale(&self, user_id: u64, locale: &Locale) -> Result<(), I18nError> {
        self.set(USER_SCOPE, user_id, locale).await
    }

    async fn clear_user_locale(&self, user_id: u64) -> Result<(), I18nError> {
        self.clear(USER_SCOPE, user_id).await
    }

    async fn guild_locale(&self, guild_id: u64) -> Result<Option<Locale>, I18nError> {
        self.get(GUILD_SCOPE, guild_id).await
    }

    async fn set_guild_locale(&self, guild_id: u64, locale: &Locale) -> Result<(), I18nError> {
        self.set(GUILD_SCOPE, guild_id, locale).await
    }

    async fn clear_guild_locale(&self, guild_id: u64) -> Result<(), I18nError> {
        self.clear(GUILD_SCOPE, guild_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn preferences_upsert_and_clear() {
        let store = SqliteLocaleStore::new("sqlite::memory:").await.unwrap();
        let de = Locale::parse("de").unwrap();
        let pt = Locale::parse("pt-BR").unwrap();

        assert_eq!(store.user_locale(7).await.unwrap(), None);
        store.set_user_locale(7, &de).await.unwrap();
        store.set_user_locale(7, &pt).await.unwrap();
        assert_eq!(store.user_locale(7).await.unwrap(), Some(pt));

        // Same id, different scope.
        assert_eq!(store.guild_locale(7).await.unwrap(), None);
        store.set_guild_locale(7, &de).await.unwrap();
        assert_eq!(store.guild_locale(7).await.unwrap(), Some(de));

        store.clear_user_locale(7).await.unwrap();
        assert_eq!(store.user_locale(7).await.unwrap(), None);
        assert!(store.guild_locale(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");
        let url = path.to_string_lossy().to_string();
        let fr = Locale::parse("fr").unwrap();

        {
            let store = SqliteLocaleStore::new(&url).await.unwrap();
            store.set_guild_locale(1, &fr).await.unwrap();
        }

        let reopened = SqliteLocaleStore::new(&url).await.unwrap();
        assert_eq!(reopened.guild_locale(1).await.unwrap(), Some(fr));
    }
}
