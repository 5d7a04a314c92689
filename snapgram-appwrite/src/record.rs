//! Wire records returned by the backend and their conversion into the model.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use snapgram_common::model::{
    Id, Page,
    auth::{Account, Session},
    file::UploadedFile,
    post::Post,
    save::SavedPost,
    user::{User, UserMarker, UserProfile, Username},
};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Error)]
pub enum DocumentDataError {
    #[error("Document {id} has malformed fields: {source}")]
    Fields {
        id: String,
        source: serde_json::Error,
    },
    #[error("Document {id} is missing its {field}")]
    Missing { id: String, field: &'static str },
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$collectionId", default)]
    pub collection_id: String,
    #[serde(rename = "$databaseId", default)]
    pub database_id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "$updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(rename = "$permissions", default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct DocumentList {
    pub total: u64,
    pub documents: Vec<Document>,
}

impl Document {
    fn fields<T: DeserializeOwned>(&self) -> Result<T, DocumentDataError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|source| {
            DocumentDataError::Fields {
                id: self.id.clone(),
                source,
            }
        })
    }
}

/// A relationship attribute, returned either as an id or as the embedded document.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(untagged)]
pub enum Related {
    Id(String),
    Embedded(EmbeddedDocument),
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct EmbeddedDocument {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Related {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Related::Id(id) => id,
            Related::Embedded(document) => &document.id,
        }
    }

    fn embedded(&self) -> Option<&EmbeddedDocument> {
        match self {
            Related::Id(_) => None,
            Related::Embedded(document) => Some(document),
        }
    }
}

/// Empty strings stand for unset URLs in stored documents.
fn optional_url<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.filter(|raw| !raw.is_empty())
        .map(|raw| Url::parse(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostFields {
    creator: Option<Related>,
    #[serde(default, deserialize_with = "null_as_default")]
    caption: String,
    image_url: Url,
    image_id: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    likes: Vec<Related>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserFields {
    account_id: String,
    name: String,
    email: String,
    #[serde(default)]
    username: Option<Username>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default, deserialize_with = "optional_url")]
    image_url: Option<Url>,
    #[serde(default)]
    image_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    liked: Vec<Related>,
    #[serde(default, deserialize_with = "null_as_default")]
    save: Vec<Related>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFields {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default)]
    username: Option<Username>,
    #[serde(default, deserialize_with = "optional_url")]
    image_url: Option<Url>,
}

#[derive(Deserialize)]
struct SaveFields {
    user: Option<Related>,
    post: Option<Related>,
}

fn profile(document: &EmbeddedDocument) -> Option<UserProfile> {
    let fields: ProfileFields = serde_json::from_value(Value::Object(document.data.clone())).ok()?;

    Some(UserProfile {
        id: Id::new(document.id.as_str()),
        name: fields.name,
        username: fields.username,
        image_url: fields.image_url,
    })
}

fn embedded_save(document: &EmbeddedDocument, owner: &Id<UserMarker>) -> Option<SavedPost> {
    let post = document.data.get("post")?;
    let post: Related = serde_json::from_value(post.clone()).ok()?;

    Some(SavedPost {
        id: Id::new(document.id.as_str()),
        user: owner.clone(),
        post: Id::new(post.id()),
    })
}

impl TryFrom<Document> for Post {
    type Error = DocumentDataError;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let fields: PostFields = document.fields()?;
        let creator = fields.creator.ok_or_else(|| DocumentDataError::Missing {
            id: document.id.clone(),
            field: "creator",
        })?;

        Ok(Self {
            id: Id::new(document.id),
            creator: Id::new(creator.id()),
            creator_profile: creator.embedded().and_then(profile),
            caption: fields.caption,
            image_url: fields.image_url,
            image_id: Id::new(fields.image_id),
            location: fields.location.filter(|location| !location.is_empty()),
            tags: fields.tags,
            likes: fields.likes.iter().map(|like| Id::new(like.id())).collect(),
            created_at: document.created_at,
            updated_at: document.updated_at,
        })
    }
}

impl TryFrom<Document> for User {
    type Error = DocumentDataError;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let fields: UserFields = document.fields()?;
        let id = Id::new(document.id);
        let saves = fields
            .save
            .iter()
            .filter_map(Related::embedded)
            .filter_map(|save| embedded_save(save, &id))
            .collect();

        Ok(Self {
            account_id: Id::new(fields.account_id),
            name: fields.name,
            email: fields.email,
            username: fields.username,
            bio: fields.bio,
            image_url: fields.image_url,
            image_id: fields.image_id.filter(|id| !id.is_empty()).map(Id::new),
            liked: fields.liked.iter().map(|post| Id::new(post.id())).collect(),
            saves,
            created_at: document.created_at,
            updated_at: document.updated_at,
            id,
        })
    }
}

impl TryFrom<Document> for SavedPost {
    type Error = DocumentDataError;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let fields: SaveFields = document.fields()?;
        let missing = |field| DocumentDataError::Missing {
            id: document.id.clone(),
            field,
        };
        let user = fields.user.ok_or_else(|| missing("user"))?;
        let post = fields.post.ok_or_else(|| missing("post"))?;

        Ok(Self {
            id: Id::new(document.id.as_str()),
            user: Id::new(user.id()),
            post: Id::new(post.id()),
        })
    }
}

pub(crate) fn into_page<T>(list: DocumentList) -> Result<Page<T>, DocumentDataError>
where
    T: TryFrom<Document, Error = DocumentDataError>,
{
    Ok(Page {
        total: list.total,
        items: list
            .documents
            .into_iter()
            .map(T::try_from)
            .collect::<Result<_, _>>()?,
    })
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct AccountRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<AccountRecord> for Account {
    fn from(value: AccountRecord) -> Self {
        Self {
            id: Id::new(value.id),
            name: value.name,
            email: value.email,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expire: OffsetDateTime,
    #[serde(default)]
    pub current: bool,
}

impl From<SessionRecord> for Session {
    fn from(value: SessionRecord) -> Self {
        Self {
            id: Id::new(value.id),
            user_id: Id::new(value.user_id),
            expire: value.expire,
            current: value.current,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size_original: u64,
}

impl From<FileRecord> for UploadedFile {
    fn from(value: FileRecord) -> Self {
        Self {
            id: Id::new(value.id),
            name: value.name,
            mime_type: value.mime_type,
            size: value.size_original,
            preview_url: None,
        }
    }
}

/// Error body of a failed request.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
    pub code: u16,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserData<'a> {
    pub account_id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub username: Option<&'a str>,
    pub image_url: &'a Url,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostData<'a> {
    pub creator: &'a str,
    pub caption: &'a str,
    pub image_url: &'a Url,
    pub image_id: &'a str,
    pub location: Option<&'a str>,
    pub tags: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostUpdateData<'a> {
    pub caption: &'a str,
    pub image_url: &'a Url,
    pub image_id: &'a str,
    pub location: Option<&'a str>,
    pub tags: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserUpdateData<'a> {
    pub name: &'a str,
    pub bio: Option<&'a str>,
    pub image_url: Option<&'a Url>,
    pub image_id: Option<&'a str>,
}

#[derive(Serialize)]
pub(crate) struct LikesData<'a> {
    pub likes: &'a [Id<UserMarker>],
}

#[derive(Serialize)]
pub(crate) struct SaveData<'a> {
    pub user: &'a str,
    pub post: &'a str,
}
