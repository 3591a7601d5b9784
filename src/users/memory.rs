use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo::{uniqueness_error, UserStore},
    repo_types::{NewUser, User},
};
use crate::error::{AppError, AppResult};

/// In-process store backing the test state.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn clashes(users: &HashMap<Uuid, User>, username: &str, email: &str, except: Uuid) -> Option<AppError> {
    let others = || users.values().filter(|u| u.id != except);
    uniqueness_error(
        others().any(|u| u.username == username),
        others().any(|u| u.email == email),
    )
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        let mut users = self.users.write();
        if let Some(err) = clashes(&users, &new.username, &new.email, Uuid::nil()) {
            return Err(err);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> AppResult<()> {
        let mut users = self.users.write();
        if let Some(err) = clashes(&users, &user.username, &user.email, user.id) {
            return Err(err);
        }
        match users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.users.write().remove(&id).is_some())
    }
}
