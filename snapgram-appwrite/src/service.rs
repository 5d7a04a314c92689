//! One trait per backend service.
//!
//! Every method performs exactly one request. Nothing here retries, batches
//! or caches.

use crate::{
    error::Result,
    query::Query,
    record::{AccountRecord, Document, DocumentList, FileRecord, SessionRecord},
};
use serde_json::Value;
use snapgram_common::model::{auth::Password, file::FileUpload};
use url::Url;

/// Session id addressing the session the client is authenticated with.
pub const CURRENT_SESSION: &str = "current";

pub trait AccountService: Send + Sync {
    fn create(
        &self,
        account_id: &str,
        email: &str,
        password: &Password,
        name: &str,
    ) -> impl Future<Output = Result<AccountRecord>> + Send;

    fn create_email_session(
        &self,
        email: &str,
        password: &Password,
    ) -> impl Future<Output = Result<SessionRecord>> + Send;

    fn get(&self) -> impl Future<Output = Result<AccountRecord>> + Send;

    fn delete_session(&self, session_id: &str) -> impl Future<Output = Result<()>> + Send;
}

pub trait DatabaseService: Send + Sync {
    fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> impl Future<Output = Result<Document>> + Send;

    fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> impl Future<Output = Result<Document>> + Send;

    fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> impl Future<Output = Result<DocumentList>> + Send;

    fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> impl Future<Output = Result<Document>> + Send;

    fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait StorageService: Send + Sync {
    fn create_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: &FileUpload,
    ) -> impl Future<Output = Result<FileRecord>> + Send;

    fn delete_file(&self, bucket_id: &str, file_id: &str)
    -> impl Future<Output = Result<()>> + Send;

    /// Derives the preview URL locally; no request is made.
    fn file_preview_url(
        &self,
        bucket_id: &str,
        file_id: &str,
        options: &PreviewOptions,
    ) -> Result<Url>;
}

pub trait AvatarService: Send + Sync {
    /// URL of an avatar image rendered from the initials of `name`.
    fn initials_url(&self, name: &str) -> Result<Url>;
}

/// Everything [`crate::Api`] needs from the backend.
pub trait Backend: AccountService + DatabaseService + StorageService + AvatarService {}

impl<T> Backend for T where T: AccountService + DatabaseService + StorageService + AvatarService {}

/// Crop anchor of every preview.
pub const PREVIEW_GRAVITY: &str = "top";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            quality: 100,
        }
    }
}
