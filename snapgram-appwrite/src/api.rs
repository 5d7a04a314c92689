//! Application operations, one remote workflow each.
//!
//! Writes that attach an uploaded file compensate by deleting the file they
//! no longer need. Compensation is best effort: a failed delete is logged and
//! the file is left orphaned.

use crate::{
    config::Resources,
    error::{AppwriteError, Result},
    query::{ATTRIBUTE_CREATED_AT, ATTRIBUTE_UPDATED_AT, Query},
    record::{
        LikesData, PostData, PostUpdateData, SaveData, UserData, UserUpdateData, into_page,
    },
    service::{Backend, CURRENT_SESSION, PreviewOptions},
};
use serde::Serialize;
use serde_json::Value;
use snapgram_common::{
    id::unique_id,
    model::{
        Id, Page,
        auth::{Credentials, Session},
        file::{FileMarker, FileUpload, UploadedFile},
        post::{NewPost, Post, PostMarker, UpdatePost},
        save::{SaveMarker, SavedPost},
        user::{NewUser, UpdateUser, User, UserMarker},
    },
    tags::parse_tags,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Posts per page of the recent and paginated post lists.
pub const PAGE_SIZE: u32 = 20;

pub const ATTRIBUTE_ACCOUNT_ID: &str = "accountId";
pub const ATTRIBUTE_CAPTION: &str = "caption";

/// Input of [`Api::save_user_to_db`].
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UserDocument {
    pub account_id: String,
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub image_url: Url,
}

/// Replacement image state for an update.
struct ImageSwap {
    image_url: Option<Url>,
    image_id: Option<Id<FileMarker>>,
    uploaded: Option<Id<FileMarker>>,
}

pub struct Api<B> {
    backend: B,
    resources: Resources,
    preview: PreviewOptions,
}

impl<B: Backend> Api<B> {
    #[must_use]
    pub fn new(backend: B, resources: Resources) -> Self {
        Self {
            backend,
            resources,
            preview: PreviewOptions::default(),
        }
    }

    #[must_use]
    pub fn with_preview_options(mut self, preview: PreviewOptions) -> Self {
        self.preview = preview;
        self
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    fn data<T: Serialize>(data: &T) -> Result<Value> {
        Ok(serde_json::to_value(data)?)
    }

    /// Creates the auth identity, then the user document referencing it.
    ///
    /// The identity is not rolled back when the document write fails.
    #[instrument(skip_all, fields(email = %user.email), err)]
    pub async fn create_user_account(&self, user: &NewUser) -> Result<User> {
        let account = self
            .backend
            .create(
                &unique_id(),
                &user.email,
                &user.password,
                &user.name,
            )
            .await?;

        let avatar_url = self.backend.initials_url(&user.name)?;

        let document = UserDocument {
            account_id: account.id.clone(),
            name: account.name,
            email: account.email,
            username: Some(user.username.get().to_owned()),
            image_url: avatar_url,
        };

        self.save_user_to_db(&document).await.inspect_err(|err| {
            warn!(
                account_id = %account.id,
                error = %err,
                "User document write failed, the auth identity has no user document"
            );
        })
    }

    #[instrument(skip_all, fields(account_id = %user.account_id), err)]
    pub async fn save_user_to_db(&self, user: &UserDocument) -> Result<User> {
        let data = Self::data(&UserData {
            account_id: &user.account_id,
            name: &user.name,
            email: &user.email,
            username: user.username.as_deref(),
            image_url: &user.image_url,
        })?;

        let document = self
            .backend
            .create_document(
                &self.resources.database_id,
                &self.resources.user_collection_id,
                &unique_id(),
                data,
            )
            .await?;

        Ok(User::try_from(document)?)
    }

    #[instrument(skip_all, fields(email = %credentials.email), err)]
    pub async fn sign_in_account(&self, credentials: &Credentials) -> Result<Session> {
        let session = self
            .backend
            .create_email_session(&credentials.email, &credentials.password)
            .await?;

        Ok(session.into())
    }

    /// The user document of the signed in account.
    #[instrument(skip_all, err)]
    pub async fn get_current_user(&self) -> Result<User> {
        let account = self.backend.get().await?;

        let list = self
            .backend
            .list_documents(
                &self.resources.database_id,
                &self.resources.user_collection_id,
                &[Query::equal(ATTRIBUTE_ACCOUNT_ID, account.id.as_str())],
            )
            .await?;

        let document = list
            .documents
            .into_iter()
            .next()
            .ok_or_else(|| AppwriteError::UserNotFound(Id::new(account.id)))?;

        Ok(User::try_from(document)?)
    }

    #[instrument(skip_all, err)]
    pub async fn sign_out_account(&self) -> Result<()> {
        self.backend.delete_session(CURRENT_SESSION).await
    }

    /// Uploads the image, then writes the post referencing it.
    ///
    /// The upload is deleted again if no post document could be written.
    #[instrument(skip_all, fields(creator = %post.creator), err)]
    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let uploaded = self.upload_file(&post.file).await?;

        let image_url = match self.get_file_preview(&uploaded.id) {
            Ok(url) => url,
            Err(err) => {
                self.discard_file(&uploaded.id).await;
                return Err(err);
            }
        };

        let tags = parse_tags(post.tags.as_deref());
        let data = Self::data(&PostData {
            creator: post.creator.get(),
            caption: &post.caption,
            image_url: &image_url,
            image_id: uploaded.id.get(),
            location: post.location.as_deref(),
            tags: &tags,
        })?;

        let created = self
            .backend
            .create_document(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                &unique_id(),
                data,
            )
            .await;

        match created {
            Ok(document) => Ok(Post::try_from(document)?),
            Err(err) => {
                self.discard_file(&uploaded.id).await;
                Err(err)
            }
        }
    }

    #[instrument(skip_all, fields(name = %file.name, size = file.len()), err)]
    pub async fn upload_file(&self, file: &FileUpload) -> Result<UploadedFile> {
        let record = self
            .backend
            .create_file(
                &self.resources.storage_id,
                &unique_id(),
                file,
            )
            .await?;

        debug!(file_id = %record.id, "Uploaded file");
        Ok(record.into())
    }

    pub fn get_file_preview(&self, file_id: &Id<FileMarker>) -> Result<Url> {
        self.backend
            .file_preview_url(&self.resources.storage_id, file_id.get(), &self.preview)
    }

    #[instrument(skip_all, fields(file_id = %file_id), err)]
    pub async fn delete_file(&self, file_id: &Id<FileMarker>) -> Result<()> {
        self.backend
            .delete_file(&self.resources.storage_id, file_id.get())
            .await
    }

    /// Deletes a file as compensation, logging instead of failing.
    async fn discard_file(&self, file_id: &Id<FileMarker>) {
        match self.delete_file(file_id).await {
            Ok(()) => debug!(%file_id, "Discarded uploaded file"),
            Err(err) => warn!(%file_id, error = %err, "Could not delete file, it is now orphaned"),
        }
    }

    /// The newest posts by creation time.
    #[instrument(skip_all, err)]
    pub async fn get_recent_posts(&self) -> Result<Page<Post>> {
        let list = self
            .backend
            .list_documents(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                &[
                    Query::order_desc(ATTRIBUTE_CREATED_AT),
                    Query::limit(PAGE_SIZE),
                ],
            )
            .await?;

        Ok(into_page(list)?)
    }

    /// Replaces the like-set of a post. Last write wins.
    #[instrument(skip_all, fields(post_id = %post_id, likes = likes.len()), err)]
    pub async fn like_post(
        &self,
        post_id: &Id<PostMarker>,
        likes: &[Id<UserMarker>],
    ) -> Result<Post> {
        let document = self
            .backend
            .update_document(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                post_id.get(),
                Self::data(&LikesData { likes })?,
            )
            .await?;

        Ok(Post::try_from(document)?)
    }

    #[instrument(skip_all, fields(user_id = %user_id, post_id = %post_id), err)]
    pub async fn save_post(
        &self,
        user_id: &Id<UserMarker>,
        post_id: &Id<PostMarker>,
    ) -> Result<SavedPost> {
        let data = Self::data(&SaveData {
            user: user_id.get(),
            post: post_id.get(),
        })?;

        let document = self
            .backend
            .create_document(
                &self.resources.database_id,
                &self.resources.saves_collection_id,
                &unique_id(),
                data,
            )
            .await?;

        Ok(SavedPost::try_from(document)?)
    }

    #[instrument(skip_all, fields(saved_record_id = %saved_record_id), err)]
    pub async fn delete_saved_post(&self, saved_record_id: &Id<SaveMarker>) -> Result<()> {
        self.backend
            .delete_document(
                &self.resources.database_id,
                &self.resources.saves_collection_id,
                saved_record_id.get(),
            )
            .await
    }

    #[instrument(skip_all, fields(post_id = %post_id), err)]
    pub async fn get_post_by_id(&self, post_id: &Id<PostMarker>) -> Result<Post> {
        let document = self
            .backend
            .get_document(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                post_id.get(),
            )
            .await?;

        Ok(Post::try_from(document)?)
    }

    /// Uploads a replacement image only when one is given.
    async fn swap_image(
        &self,
        file: Option<&FileUpload>,
        image_url: Option<&Url>,
        image_id: Option<&Id<FileMarker>>,
    ) -> Result<ImageSwap> {
        let Some(file) = file else {
            return Ok(ImageSwap {
                image_url: image_url.cloned(),
                image_id: image_id.cloned(),
                uploaded: None,
            });
        };

        let uploaded = self.upload_file(file).await?;
        let image_url = match self.get_file_preview(&uploaded.id) {
            Ok(url) => url,
            Err(err) => {
                self.discard_file(&uploaded.id).await;
                return Err(err);
            }
        };

        Ok(ImageSwap {
            image_url: Some(image_url),
            image_id: Some(uploaded.id.clone()),
            uploaded: Some(uploaded.id),
        })
    }

    /// Settles a swap once the document write finished: exactly one of the
    /// new and the previous file is deleted when a new file was uploaded.
    async fn settle_image<T>(
        &self,
        swap: &ImageSwap,
        previous: Option<&Id<FileMarker>>,
        written: Result<T>,
    ) -> Result<T> {
        let Some(uploaded) = &swap.uploaded else {
            return written;
        };

        match written {
            Ok(value) => {
                if let Some(previous) = previous
                    && !previous.is_empty()
                {
                    self.discard_file(previous).await;
                }
                Ok(value)
            }
            Err(err) => {
                self.discard_file(uploaded).await;
                Err(err)
            }
        }
    }

    #[instrument(skip_all, fields(post_id = %post.post_id, new_file = post.file.is_some()), err)]
    pub async fn update_post(&self, post: &UpdatePost) -> Result<Post> {
        let swap = self
            .swap_image(
                post.file.as_ref(),
                Some(&post.image_url),
                Some(&post.image_id),
            )
            .await?;

        let tags = parse_tags(post.tags.as_deref());
        let image_url = swap.image_url.as_ref().unwrap_or(&post.image_url);
        let image_id = swap.image_id.as_ref().unwrap_or(&post.image_id);
        let data = Self::data(&PostUpdateData {
            caption: &post.caption,
            image_url,
            image_id: image_id.get(),
            location: post.location.as_deref(),
            tags: &tags,
        })?;

        let written = self
            .backend
            .update_document(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                post.post_id.get(),
                data,
            )
            .await;

        let document = self
            .settle_image(&swap, Some(&post.image_id), written)
            .await?;
        Ok(Post::try_from(document)?)
    }

    /// Deletes the post document, then its image.
    #[instrument(skip_all, fields(post_id = %post_id, image_id = %image_id), err)]
    pub async fn delete_post(
        &self,
        post_id: &Id<PostMarker>,
        image_id: &Id<FileMarker>,
    ) -> Result<()> {
        if post_id.is_empty() || image_id.is_empty() {
            return Err(AppwriteError::EmptyId);
        }

        self.backend
            .delete_document(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                post_id.get(),
            )
            .await?;

        self.discard_file(image_id).await;
        info!("Deleted post");
        Ok(())
    }

    /// One page of posts, most recently updated first.
    ///
    /// `cursor` is the id of the last post of the previous page.
    #[instrument(skip_all, fields(cursor = cursor.map(Id::get)), err)]
    pub async fn get_infinite_posts(&self, cursor: Option<&Id<PostMarker>>) -> Result<Page<Post>> {
        let mut queries = vec![
            Query::order_desc(ATTRIBUTE_UPDATED_AT),
            Query::limit(PAGE_SIZE),
        ];
        if let Some(cursor) = cursor {
            queries.push(Query::cursor_after(cursor.get()));
        }

        let list = self
            .backend
            .list_documents(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                &queries,
            )
            .await?;

        Ok(into_page(list)?)
    }

    /// Full-text search over captions, ranked by the service.
    #[instrument(skip_all, fields(search_term = %search_term), err)]
    pub async fn search_posts(&self, search_term: &str) -> Result<Page<Post>> {
        let list = self
            .backend
            .list_documents(
                &self.resources.database_id,
                &self.resources.post_collection_id,
                &[Query::search(ATTRIBUTE_CAPTION, search_term)],
            )
            .await?;

        Ok(into_page(list)?)
    }

    #[instrument(skip_all, fields(limit = ?limit), err)]
    pub async fn get_users(&self, limit: Option<u32>) -> Result<Page<User>> {
        let mut queries = vec![Query::order_desc(ATTRIBUTE_CREATED_AT)];
        if let Some(limit) = limit {
            queries.push(Query::limit(limit));
        }

        let list = self
            .backend
            .list_documents(
                &self.resources.database_id,
                &self.resources.user_collection_id,
                &queries,
            )
            .await?;

        Ok(into_page(list)?)
    }

    #[instrument(skip_all, fields(user_id = %user_id), err)]
    pub async fn get_user_by_id(&self, user_id: &Id<UserMarker>) -> Result<User> {
        let document = self
            .backend
            .get_document(
                &self.resources.database_id,
                &self.resources.user_collection_id,
                user_id.get(),
            )
            .await?;

        Ok(User::try_from(document)?)
    }

    #[instrument(skip_all, fields(user_id = %user.user_id, new_file = user.file.is_some()), err)]
    pub async fn update_user(&self, user: &UpdateUser) -> Result<User> {
        let swap = self
            .swap_image(
                user.file.as_ref(),
                user.image_url.as_ref(),
                user.image_id.as_ref(),
            )
            .await?;

        let data = Self::data(&UserUpdateData {
            name: &user.name,
            bio: user.bio.as_deref(),
            image_url: swap.image_url.as_ref(),
            image_id: swap.image_id.as_ref().map(Id::get),
        })?;

        let written = self
            .backend
            .update_document(
                &self.resources.database_id,
                &self.resources.user_collection_id,
                user.user_id.get(),
                data,
            )
            .await;

        let document = self
            .settle_image(&swap, user.image_id.as_ref(), written)
            .await?;
        Ok(User::try_from(document)?)
    }
}
