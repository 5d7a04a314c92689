use crate::model::{Id, post::PostMarker, user::UserMarker};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SaveMarker;

/// Bookmark edge between a user and a post.
///
/// At most one per (user, post) pair by convention; nothing enforces it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct SavedPost {
    pub id: Id<SaveMarker>,
    pub user: Id<UserMarker>,
    pub post: Id<PostMarker>,
}
