// In-memory LocaleStore. Preferences are lost on restart; used in tests and
// when the bot runs without a data directory.

use crate::core::i18n::{I18nError, Locale, LocaleStore};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryLocaleStore {
    users: DashMap<u64, Locale>,
    guilds: DashMap<u64, Locale>,
}

impl InMemoryLocaleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocaleStore for InMemoryLocaleStore {
    async fn user_locale(&self, user_id: u64) -> Result<Option<Locale>, I18nError> {
        Ok(self.users.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn set_user_locale(&self, user_id: u64, locale: &Locale) -> Result<(), I18nError> {
        self.users.insert(user_id, locale.clone());
        Ok(())
    }

    async fn clear_user_locale(&self, user_id: u64) -> Result<(), I18nError> {
        self.users.remove(&user_id);
        Ok(())
    }

    async fn guild_locale(&self, guild_id: u64) -> Result<Option<Locale>, I18nError> {
        Ok(self.guilds.get(&guild_id).map(|entry| entry.value().clone()))
    }

    async fn set_guild_locale(&self, guild_id: u64, locale: &Locale) -> Result<(), I18nError> {
        self.guilds.insert(guild_id, locale.clone());
        Ok(())
    }

    async fn clear_guild_locale(&self, guild_id: u64) -> Result<(), I18nError> {
        self.guilds.remove(&guild_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn users_and_guilds_are_separate() {
        let store = InMemoryLocaleStore::new();
        let fr = Locale::parse("fr").unwrap();

        store.set_user_locale(1, &fr).await.unwrap();
        assert_eq!(store.user_locale(1).await.unwrap(), Some(fr.clone()));
        assert_eq!(store.guild_locale(1).await.unwrap(), None);

        store.clear_user_locale(1).await.unwrap();
        assert_eq!(store.user_locale(1).await.unwrap(), None);
    }
}
