use crate::model::{Id, user::AccountMarker};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SessionMarker;

/// Authentication identity, separate from the user document.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Account {
    pub id: Id<AccountMarker>,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Session {
    pub id: Id<SessionMarker>,
    pub user_id: Id<AccountMarker>,
    #[serde(with = "time::serde::rfc3339")]
    pub expire: OffsetDateTime,
    pub current: bool,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Password(String);

impl Password {
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Credentials {
    pub email: String,
    pub password: Password,
}
