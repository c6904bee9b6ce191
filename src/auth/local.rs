use std::sync::Arc;

use super::Authenticator;
use super::password;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::User;

/// Verifies passwords against the hashes kept in the entity store.
pub struct LocalAuthenticator {
    store: Arc<dyn Store>,
}

impl LocalAuthenticator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Authenticator for LocalAuthenticator {
    fn name(&self) -> &'static str {
        "local"
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .get_user(username)?
            .ok_or(Error::InvalidCredentials)?;

        if !password::verify(password, &user.salt, &user.password_hash) {
            return Err(Error::InvalidCredentials);
        }
        if !user.status.is_active() {
            return Err(Error::UserInactive);
        }

        Ok(user)
    }
}

/// Fetches the local record an external backend vouches for. External
/// backends never create accounts, so a missing record is a failed login.
pub(super) fn active_local_user(store: &dyn Store, username: &str) -> Result<User> {
    let user = store
        .get_user(username)?
        .ok_or(Error::InvalidCredentials)?;
    if !user.status.is_active() {
        return Err(Error::UserInactive);
    }
    Ok(user)
}
