//! Cache keys: an operation tag plus the parameters of the read.

use snapgram_common::model::{Id, post::PostMarker, user::UserMarker};
use std::fmt::{self, Display, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum QueryTag {
    CurrentUser,
    RecentPosts,
    InfinitePosts,
    PostById,
    SearchPosts,
    Users,
    UserById,
}

impl QueryTag {
    pub const ALL: [QueryTag; 7] = [
        QueryTag::CurrentUser,
        QueryTag::RecentPosts,
        QueryTag::InfinitePosts,
        QueryTag::PostById,
        QueryTag::SearchPosts,
        QueryTag::Users,
        QueryTag::UserById,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            QueryTag::CurrentUser => "getCurrentUser",
            QueryTag::RecentPosts => "getRecentPosts",
            QueryTag::InfinitePosts => "getInfinitePosts",
            QueryTag::PostById => "getPostById",
            QueryTag::SearchPosts => "searchPosts",
            QueryTag::Users => "getUsers",
            QueryTag::UserById => "getUserById",
        }
    }
}

impl Display for QueryTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum QueryKey {
    CurrentUser,
    RecentPosts,
    InfinitePosts,
    PostById(Id<PostMarker>),
    SearchPosts(String),
    Users(Option<u32>),
    UserById(Id<UserMarker>),
}

impl QueryKey {
    pub fn tag(&self) -> QueryTag {
        match self {
            QueryKey::CurrentUser => QueryTag::CurrentUser,
            QueryKey::RecentPosts => QueryTag::RecentPosts,
            QueryKey::InfinitePosts => QueryTag::InfinitePosts,
            QueryKey::PostById(_) => QueryTag::PostById,
            QueryKey::SearchPosts(_) => QueryTag::SearchPosts,
            QueryKey::Users(_) => QueryTag::Users,
            QueryKey::UserById(_) => QueryTag::UserById,
        }
    }

    /// The key reading the entity `id`, for tags keyed by a single id.
    pub fn by_id(tag: QueryTag, id: &str) -> Option<Self> {
        match tag {
            QueryTag::PostById => Some(QueryKey::PostById(Id::new(id))),
            QueryTag::UserById => Some(QueryKey::UserById(Id::new(id))),
            _ => None,
        }
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match self {
            QueryKey::PostById(id) => write!(f, "[{tag}, {id}]"),
            QueryKey::UserById(id) => write!(f, "[{tag}, {id}]"),
            QueryKey::SearchPosts(term) => write!(f, "[{tag}, {term:?}]"),
            QueryKey::Users(Some(limit)) => write!(f, "[{tag}, {limit}]"),
            QueryKey::CurrentUser
            | QueryKey::RecentPosts
            | QueryKey::InfinitePosts
            | QueryKey::Users(None) => write!(f, "[{tag}]"),
        }
    }
}

/// Selects cached keys by prefix: a whole tag, or one exact key.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum KeyFilter {
    Tag(QueryTag),
    Exact(QueryKey),
}

impl KeyFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::Tag(tag) => key.tag() == *tag,
            KeyFilter::Exact(exact) => exact == key,
        }
    }
}

impl From<QueryTag> for KeyFilter {
    fn from(tag: QueryTag) -> Self {
        KeyFilter::Tag(tag)
    }
}

impl From<QueryKey> for KeyFilter {
    fn from(key: QueryKey) -> Self {
        KeyFilter::Exact(key)
    }
}

#[cfg(test)]
mod tests {
    use crate::keys::{KeyFilter, QueryKey, QueryTag};
    use snapgram_common::model::Id;

    #[test]
    fn tag_filter_matches_every_parameter() {
        let filter = KeyFilter::Tag(QueryTag::PostById);

        assert!(filter.matches(&QueryKey::PostById(Id::new("p1"))));
        assert!(filter.matches(&QueryKey::PostById(Id::new("p2"))));
        assert!(!filter.matches(&QueryKey::RecentPosts));
    }

    #[test]
    fn exact_filter_matches_one_key() {
        let filter = KeyFilter::Exact(QueryKey::PostById(Id::new("p1")));

        assert!(filter.matches(&QueryKey::PostById(Id::new("p1"))));
        assert!(!filter.matches(&QueryKey::PostById(Id::new("p2"))));
    }

    #[test]
    fn display() {
        assert_eq!(QueryKey::CurrentUser.to_string(), "[getCurrentUser]");
        assert_eq!(
            QueryKey::PostById(Id::new("p1")).to_string(),
            "[getPostById, p1]"
        );
        assert_eq!(
            QueryKey::SearchPosts("sun set".to_owned()).to_string(),
            "[searchPosts, \"sun set\"]"
        );
        assert_eq!(QueryKey::Users(Some(10)).to_string(), "[getUsers, 10]");
    }

    #[test]
    fn by_id_only_for_id_keyed_tags() {
        assert_eq!(
            QueryKey::by_id(QueryTag::UserById, "u1"),
            Some(QueryKey::UserById(Id::new("u1")))
        );
        assert_eq!(QueryKey::by_id(QueryTag::RecentPosts, "p1"), None);
        assert!(
            QueryTag::ALL
                .iter()
                .all(|tag| QueryKey::by_id(*tag, "x").is_none_or(|key| key.tag() == *tag))
        );
    }
}
