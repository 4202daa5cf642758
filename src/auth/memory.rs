//! In-memory repositories with the same uniqueness rules as the Postgres schema.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::storage::{
    CreateUserOutcome, InsertSessionOutcome, NewSession, NewUserRecord, Session,
    SessionRepository, User, UserCredentials, UserRepository,
};

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<UserCredentials>>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create_user(&self, record: &NewUserRecord) -> Result<CreateUserOutcome> {
        let mut users = self.users.lock().await;
        if users.iter().any(|existing| {
            existing.user.email == record.email || existing.user.username == record.username
        }) {
            return Ok(CreateUserOutcome::Conflict);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: record.email.clone(),
            username: record.username.clone(),
            status: "active".to_string(),
        };
        users.push(UserCredentials {
            user: user.clone(),
            password_digest: record.password_digest.clone(),
        });
        Ok(CreateUserOutcome::Created(user))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|existing| existing.user.id == id)
            .map(|existing| existing.user.clone()))
    }

    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|existing| existing.user.email == email)
            .cloned())
    }

    async fn count(&self) -> Result<i64> {
        Ok(i64::try_from(self.users.lock().await.len())?)
    }
}

/// Sessions keyed by token hash.
#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<Vec<u8>, Session>>,
}

impl MemorySessionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All sessions owned by `user_id`.
    pub async fn sessions_for(&self, user_id: Uuid) -> Vec<Session> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert_session(&self, new: &NewSession) -> Result<InsertSessionOutcome> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&new.token_hash) {
            return Ok(InsertSessionOutcome::DuplicateToken);
        }

        let now = now_unix();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            user_agent: new.user_agent.clone(),
            ip_address: new.ip_address,
            created_at_unix: now,
            updated_at_unix: now,
        };
        sessions.insert(new.token_hash.clone(), session.clone());
        Ok(InsertSessionOutcome::Inserted(session))
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        Ok(self.sessions.lock().await.get(token_hash).cloned())
    }

    async fn touch(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.values_mut().find(|session| session.id == id) {
            session.updated_at_unix = now_unix();
        }
        Ok(())
    }

    async fn delete_by_token_hash(&self, token_hash: &[u8]) -> Result<bool> {
        Ok(self.sessions.lock().await.remove(token_hash).is_some())
    }

    async fn count(&self) -> Result<i64> {
        Ok(i64::try_from(self.sessions.lock().await.len())?)
    }
}
