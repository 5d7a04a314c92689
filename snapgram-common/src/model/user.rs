use crate::model::{
    Id, Identified,
    auth::Password,
    file::{FileMarker, FileUpload},
    post::PostMarker,
    save::SavedPost,
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

pub const USERNAME_MIN_LEN: usize = 2;
pub const USERNAME_MAX_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// Marks ids of authentication identities, as opposed to user documents.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AccountMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub account_id: Id<AccountMarker>,
    pub name: String,
    pub email: String,
    pub username: Option<Username>,
    pub bio: Option<String>,
    pub image_url: Option<Url>,
    pub image_id: Option<Id<FileMarker>>,
    pub liked: Vec<Id<PostMarker>>,
    pub saves: Vec<SavedPost>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// The save record bookmarking `post`, if the user saved it.
    #[must_use]
    pub fn saved_record_for(&self, post: &Id<PostMarker>) -> Option<&SavedPost> {
        self.saves.iter().find(|save| &save.post == post)
    }

    #[must_use]
    pub fn has_liked(&self, post: &Id<PostMarker>) -> bool {
        self.liked.contains(post)
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            username: self.username.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

impl Identified for User {
    fn cursor_id(&self) -> &str {
        self.id.get()
    }
}

/// The part of a user that is embedded into documents referencing them.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: Id<UserMarker>,
    pub name: String,
    pub username: Option<Username>,
    pub image_url: Option<Url>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub username: Username,
    pub password: Password,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdateUser {
    pub user_id: Id<UserMarker>,
    pub name: String,
    pub bio: Option<String>,
    /// Current avatar, kept when no replacement file is given.
    pub image_url: Option<Url>,
    pub image_id: Option<Id<FileMarker>>,
    pub file: Option<FileUpload>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let len = username.chars().count();
        if (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Username {
    type Error = InvalidUsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}
