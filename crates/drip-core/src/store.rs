//! User persistence port and its implementations.
//!
//! Persistence proper is not a core concern; the core talks to a narrow
//! key-value collaborator. The JSON-file store mirrors the layout the bot
//! has always used (one object keyed by chat id).

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{domain::ChatId, user::User, Result};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, chat_id: ChatId) -> Result<Option<User>>;
    async fn put(&self, user: User) -> Result<()>;
    async fn delete(&self, chat_id: ChatId) -> Result<()>;
    async fn all_active(&self) -> Result<Vec<User>>;
}

/// In-memory store, used in tests and as the default for ephemeral runs.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<i64, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(&chat_id.0).cloned())
    }

    async fn put(&self, user: User) -> Result<()> {
        self.users.lock().await.insert(user.chat_id.0, user);
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId) -> Result<()> {
        self.users.lock().await.remove(&chat_id.0);
        Ok(())
    }

    async fn all_active(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .filter(|u| u.active)
            .cloned()
            .collect())
    }
}

/// JSON-file-backed store. The whole map is kept in memory and written
/// through on every mutation; fine for the user counts this bot sees.
pub struct JsonUserStore {
    path: PathBuf,
    users: Mutex<HashMap<i64, User>>,
}

impl JsonUserStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let users = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let by_key: HashMap<String, User> = serde_json::from_str(&raw)?;
                by_key
                    .into_values()
                    .map(|u| (u.chat_id.0, u))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    async fn persist(&self, users: &HashMap<i64, User>) -> Result<()> {
        let by_key: HashMap<String, &User> =
            users.iter().map(|(k, v)| (k.to_string(), v)).collect();
        let raw = serde_json::to_string_pretty(&by_key)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(&chat_id.0).cloned())
    }

    async fn put(&self, user: User) -> Result<()> {
        let mut users = self.users.lock().await;
        users.insert(user.chat_id.0, user);
        self.persist(&users).await
    }

    async fn delete(&self, chat_id: ChatId) -> Result<()> {
        let mut users = self.users.lock().await;
        users.remove(&chat_id.0);
        self.persist(&users).await
    }

    async fn all_active(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .filter(|u| u.active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{Language, SkipDays};

    fn user(chat_id: i64, active: bool) -> User {
        User {
            chat_id: ChatId(chat_id),
            language: Language::En,
            timezone: chrono_tz::UTC,
            send_time: "09:00".parse().unwrap(),
            skip_days: SkipDays::empty(),
            active,
            last_delivered: None,
        }
    }

    #[tokio::test]
    async fn in_memory_put_get_delete() {
        let store = InMemoryUserStore::new();
        store.put(user(1, true)).await.unwrap();
        store.put(user(2, false)).await.unwrap();

        assert!(store.get(ChatId(1)).await.unwrap().is_some());
        assert_eq!(store.all_active().await.unwrap().len(), 1);

        store.delete(ChatId(1)).await.unwrap();
        assert!(store.get(ChatId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_store_round_trips() {
        let dir = std::env::temp_dir().join(format!("drip-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("users.json");
        let _ = std::fs::remove_file(&path);

        {
            let store = JsonUserStore::open(path.clone()).unwrap();
            store.put(user(10, true)).await.unwrap();
            store.put(user(11, true)).await.unwrap();
        }

        let store = JsonUserStore::open(path.clone()).unwrap();
        assert!(store.get(ChatId(10)).await.unwrap().is_some());
        assert_eq!(store.all_active().await.unwrap().len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
