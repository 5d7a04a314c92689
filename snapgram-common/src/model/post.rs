use crate::model::{
    Id, Identified,
    file::{FileMarker, FileUpload},
    user::{UserMarker, UserProfile},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub creator: Id<UserMarker>,
    /// Present when the creator was embedded in the post document.
    pub creator_profile: Option<UserProfile>,
    pub caption: String,
    pub image_url: Url,
    pub image_id: Id<FileMarker>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub likes: Vec<Id<UserMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Post {
    #[must_use]
    pub fn is_liked_by(&self, user: &Id<UserMarker>) -> bool {
        self.likes.contains(user)
    }

    /// The full like-set after `user` toggles their like.
    ///
    /// Likes are written as a whole, so concurrent togglers overwrite each other.
    #[must_use]
    pub fn likes_toggled(&self, user: &Id<UserMarker>) -> Vec<Id<UserMarker>> {
        if self.is_liked_by(user) {
            self.likes.iter().filter(|like| *like != user).cloned().collect()
        } else {
            let mut likes = self.likes.clone();
            likes.push(user.clone());
            likes
        }
    }
}

impl Identified for Post {
    fn cursor_id(&self) -> &str {
        self.id.get()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub creator: Id<UserMarker>,
    pub caption: String,
    pub file: FileUpload,
    pub location: Option<String>,
    /// Comma separated, normalized with [`crate::tags::parse_tags`].
    pub tags: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdatePost {
    pub post_id: Id<PostMarker>,
    pub caption: String,
    pub image_url: Url,
    pub image_id: Id<FileMarker>,
    /// Replacement image; the current one is kept when absent.
    pub file: Option<FileUpload>,
    pub location: Option<String>,
    pub tags: Option<String>,
}

impl UpdatePost {
    /// An update that rewrites `post` with its current contents.
    #[must_use]
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.id.clone(),
            caption: post.caption.clone(),
            image_url: post.image_url.clone(),
            image_id: post.image_id.clone(),
            file: None,
            location: post.location.clone(),
            tags: Some(post.tags.join(",")),
        }
    }
}
