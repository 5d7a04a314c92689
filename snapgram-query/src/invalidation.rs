//! Which cached reads a successful write makes stale.
//!
//! Mutations only name the entities they change. The queries depending on
//! each entity kind are declared once, in [`DEPENDENCIES`].

use crate::keys::{KeyFilter, QueryKey, QueryTag};
use snapgram_common::model::{Id, post::PostMarker, save::SaveMarker, user::UserMarker};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum EntityKind {
    Session,
    User,
    Post,
    Save,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Dependent {
    /// Every query with the tag.
    All(QueryTag),
    /// Only the query reading the changed entity. Nothing when the entity is
    /// new and so has no id cached yet.
    Matching(QueryTag),
}

pub const DEPENDENCIES: &[(EntityKind, &[Dependent])] = &[
    (EntityKind::Session, &[Dependent::All(QueryTag::CurrentUser)]),
    (
        EntityKind::User,
        &[
            Dependent::All(QueryTag::CurrentUser),
            Dependent::All(QueryTag::Users),
            Dependent::Matching(QueryTag::UserById),
        ],
    ),
    (
        EntityKind::Post,
        &[
            Dependent::Matching(QueryTag::PostById),
            Dependent::All(QueryTag::RecentPosts),
            Dependent::All(QueryTag::InfinitePosts),
            Dependent::All(QueryTag::SearchPosts),
            Dependent::All(QueryTag::CurrentUser),
        ],
    ),
    // Posts embed their saves, users embed their saved posts.
    (
        EntityKind::Save,
        &[
            Dependent::All(QueryTag::RecentPosts),
            Dependent::All(QueryTag::InfinitePosts),
            Dependent::All(QueryTag::CurrentUser),
        ],
    ),
];

pub fn dependents(entity: EntityKind) -> &'static [Dependent] {
    DEPENDENCIES
        .iter()
        .find(|(kind, _)| *kind == entity)
        .map_or(&[][..], |(_, dependents)| *dependents)
}

/// One changed entity, with its id when it already existed.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Change {
    pub entity: EntityKind,
    pub id: Option<String>,
}

impl Change {
    pub fn new(entity: EntityKind) -> Self {
        Self { entity, id: None }
    }

    pub fn of(entity: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity,
            id: Some(id.into()),
        }
    }

    pub fn filters(&self) -> impl Iterator<Item = KeyFilter> + '_ {
        dependents(self.entity)
            .iter()
            .filter_map(|dependent| match dependent {
                Dependent::All(tag) => Some(KeyFilter::Tag(*tag)),
                Dependent::Matching(tag) => self
                    .id
                    .as_deref()
                    .and_then(|id| QueryKey::by_id(*tag, id))
                    .map(KeyFilter::Exact),
            })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Mutation {
    CreateUserAccount,
    SignIn,
    SignOut,
    CreatePost,
    LikePost(Id<PostMarker>),
    SavePost(Id<PostMarker>),
    DeleteSavedPost(Id<SaveMarker>),
    UpdatePost(Id<PostMarker>),
    DeletePost(Id<PostMarker>),
    UpdateUser(Id<UserMarker>),
}

impl Mutation {
    pub fn changes(&self) -> Vec<Change> {
        match self {
            Mutation::CreateUserAccount => vec![Change::new(EntityKind::User)],
            Mutation::SignIn | Mutation::SignOut => vec![Change::new(EntityKind::Session)],
            Mutation::CreatePost => vec![Change::new(EntityKind::Post)],
            Mutation::LikePost(post_id)
            | Mutation::UpdatePost(post_id)
            | Mutation::DeletePost(post_id) => vec![Change::of(EntityKind::Post, post_id.get())],
            Mutation::SavePost(_) => vec![Change::new(EntityKind::Save)],
            Mutation::DeleteSavedPost(saved_id) => vec![Change::of(EntityKind::Save, saved_id.get())],
            Mutation::UpdateUser(user_id) => vec![Change::of(EntityKind::User, user_id.get())],
        }
    }

    /// The deduplicated filters to invalidate once the mutation succeeded.
    pub fn invalidates(&self) -> Vec<KeyFilter> {
        let mut filters: Vec<KeyFilter> = Vec::new();
        for change in self.changes() {
            for filter in change.filters() {
                if !filters.contains(&filter) {
                    filters.push(filter);
                }
            }
        }
        filters
    }
}
