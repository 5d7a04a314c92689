pub mod auth;
pub mod file;
pub mod post;
pub mod save;
pub mod user;

use crate::model::user::InvalidUsernameError;
use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Clone, PartialEq, Debug, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error("Form validation failed: {0}")]
    Form(#[from] ValidationErrors),
}

/// Document id of the entity identified by `Marker`.
///
/// Ids are assigned by the backend (or generated client-side with
/// [`crate::id::unique_id`]) and are opaque strings on the wire.
#[derive_where(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(String, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into(), PhantomData)
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// An empty id never names a document; queries keyed on it stay idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn unique() -> Self {
        Self::new(crate::id::unique_id())
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<String> for Id<Marker> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<&str> for Id<Marker> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for String {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> AsRef<str> for Id<Marker> {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Anything that can serve as a pagination cursor.
pub trait Identified {
    fn cursor_id(&self) -> &str;
}

/// One page of a list call.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Page<T> {
    /// Number of documents matching the query across all pages.
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total: 0,
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, post::PostMarker, user::UserMarker};

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = Id::<PostMarker>::new("6531f0a2b9c4d");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"6531f0a2b9c4d\"");

        let parsed: Id<UserMarker> = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed.get(), "abc");
    }

    #[test]
    fn empty_ids() {
        assert!(Id::<PostMarker>::default().is_empty());
        assert!(!Id::<PostMarker>::from("x").is_empty());
    }
}
