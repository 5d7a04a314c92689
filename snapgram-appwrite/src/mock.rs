//! In-memory backend recording every call, for tests of code built on [`crate::Api`].

use crate::{
    config::Resources,
    error::{AppwriteError, Result},
    query::{ATTRIBUTE_CREATED_AT, ATTRIBUTE_UPDATED_AT, Query},
    record::{AccountRecord, Document, DocumentList, FileRecord, SessionRecord},
    service::{
        AccountService, AvatarService, CURRENT_SESSION, DatabaseService, PREVIEW_GRAVITY,
        PreviewOptions, StorageService,
    },
};
use serde_json::{Map, Value};
use snapgram_common::model::{auth::Password, file::FileUpload};
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::{Duration, OffsetDateTime};
use url::Url;

pub const MOCK_ENDPOINT: &str = "https://appwrite.test/v1";
/// Page size applied by the service when a list call sets no limit.
pub const DEFAULT_LIST_LIMIT: usize = 25;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Operation {
    CreateAccount,
    CreateSession,
    GetAccount,
    DeleteSession,
    CreateDocument,
    GetDocument,
    ListDocuments,
    UpdateDocument,
    DeleteDocument,
    CreateFile,
    DeleteFile,
    FilePreview,
    InitialsUrl,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Call {
    CreateAccount {
        email: String,
    },
    CreateSession {
        email: String,
    },
    GetAccount,
    DeleteSession {
        session_id: String,
    },
    CreateDocument {
        collection_id: String,
        document_id: String,
        data: Value,
    },
    GetDocument {
        collection_id: String,
        document_id: String,
    },
    ListDocuments {
        collection_id: String,
        queries: Vec<Query>,
    },
    UpdateDocument {
        collection_id: String,
        document_id: String,
        data: Value,
    },
    DeleteDocument {
        collection_id: String,
        document_id: String,
    },
    CreateFile {
        file_id: String,
        name: String,
    },
    DeleteFile {
        file_id: String,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failing: HashSet<Operation>,
    accounts: Vec<(AccountRecord, Password)>,
    session: Option<String>,
    collections: HashMap<String, Vec<Document>>,
    files: HashMap<String, FileRecord>,
    clock: i64,
}

impl State {
    fn check(&self, operation: Operation) -> Result<()> {
        if self.failing.contains(&operation) {
            return Err(AppwriteError::Service {
                code: 500,
                kind: "general_mock".to_owned(),
                message: format!("{operation:?} failed"),
            });
        }
        Ok(())
    }

    /// Advances the clock so every write gets a distinct timestamp.
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::days(19_723) + Duration::seconds(self.clock)
    }

    fn collection(&mut self, collection_id: &str) -> &mut Vec<Document> {
        self.collections
            .entry(collection_id.to_owned())
            .or_default()
    }
}

pub struct MockBackend {
    state: Mutex<State>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn document_not_found(document_id: &str) -> AppwriteError {
    AppwriteError::not_found(
        "document_not_found",
        format!("Document with the requested ID '{document_id}' could not be found."),
    )
}

fn object(data: Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(AppwriteError::Service {
            code: 400,
            kind: "document_invalid_structure".to_owned(),
            message: format!("Document data must be an object, got {other}"),
        }),
    }
}

fn attribute<'a>(document: &'a Document, attribute: &str) -> Option<&'a Value> {
    document.data.get(attribute)
}

fn compare(a: &Document, b: &Document, attribute_name: &str) -> Ordering {
    match attribute_name {
        ATTRIBUTE_CREATED_AT => a.created_at.cmp(&b.created_at),
        ATTRIBUTE_UPDATED_AT => a.updated_at.cmp(&b.updated_at),
        "$id" => a.id.cmp(&b.id),
        _ => attribute(a, attribute_name)
            .map(ToString::to_string)
            .cmp(&attribute(b, attribute_name).map(ToString::to_string)),
    }
}

fn matches_search(document: &Document, attribute_name: &str, term: &str) -> bool {
    let Some(Value::String(text)) = attribute(document, attribute_name) else {
        return false;
    };
    let text = text.to_lowercase();

    term.split_whitespace()
        .any(|word| text.contains(&word.to_lowercase()))
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Resource ids matching the collections this backend is seeded with.
    #[must_use]
    pub fn resources() -> Resources {
        Resources {
            database_id: "db".to_owned(),
            storage_id: "media".to_owned(),
            user_collection_id: "users".to_owned(),
            post_collection_id: "posts".to_owned(),
            saves_collection_id: "saves".to_owned(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later call of `operation` fail with a 500.
    pub fn fail(&self, operation: Operation) {
        self.state().failing.insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.state().failing.remove(&operation);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Stores a document directly, without recording a call.
    pub fn insert_document(&self, collection_id: &str, document_id: &str, data: Value) -> Document {
        let mut state = self.state();
        let now = state.tick();
        let document = Document {
            id: document_id.to_owned(),
            collection_id: collection_id.to_owned(),
            database_id: Self::resources().database_id,
            created_at: now,
            updated_at: now,
            permissions: Vec::new(),
            data: object(data).unwrap_or_default(),
        };
        state.collection(collection_id).push(document.clone());
        document
    }

    #[must_use]
    pub fn document(&self, collection_id: &str, document_id: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection_id)?
            .iter()
            .find(|document| document.id == document_id)
            .cloned()
    }

    #[must_use]
    pub fn documents(&self, collection_id: &str) -> Vec<Document> {
        self.state()
            .collections
            .get(collection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stores a file directly, without recording a call.
    pub fn insert_file(&self, file_id: &str) {
        self.state().files.insert(
            file_id.to_owned(),
            FileRecord {
                id: file_id.to_owned(),
                name: format!("{file_id}.png"),
                mime_type: "image/png".to_owned(),
                size_original: 0,
            },
        );
    }

    #[must_use]
    pub fn has_file(&self, file_id: &str) -> bool {
        self.state().files.contains_key(file_id)
    }

    #[must_use]
    pub fn file_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.state().files.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registers an account and signs it in.
    pub fn sign_in_as(&self, account_id: &str, email: &str) {
        let mut state = self.state();
        state.accounts.push((
            AccountRecord {
                id: account_id.to_owned(),
                name: account_id.to_owned(),
                email: email.to_owned(),
            },
            Password::new("password"),
        ));
        state.session = Some(account_id.to_owned());
    }
}

impl AccountService for MockBackend {
    async fn create(
        &self,
        account_id: &str,
        email: &str,
        password: &Password,
        name: &str,
    ) -> Result<AccountRecord> {
        let mut state = self.state();
        state.calls.push(Call::CreateAccount {
            email: email.to_owned(),
        });
        state.check(Operation::CreateAccount)?;

        if state.accounts.iter().any(|(account, _)| account.email == email) {
            return Err(AppwriteError::Service {
                code: 409,
                kind: "user_already_exists".to_owned(),
                message: "A user with the same id, email, or phone already exists.".to_owned(),
            });
        }

        let account = AccountRecord {
            id: account_id.to_owned(),
            name: name.to_owned(),
            email: email.to_owned(),
        };
        state.accounts.push((account.clone(), password.clone()));
        Ok(account)
    }

    async fn create_email_session(&self, email: &str, password: &Password) -> Result<SessionRecord> {
        let mut state = self.state();
        state.calls.push(Call::CreateSession {
            email: email.to_owned(),
        });
        state.check(Operation::CreateSession)?;

        let account_id = state
            .accounts
            .iter()
            .find(|(account, stored)| account.email == email && stored == password)
            .map(|(account, _)| account.id.clone())
            .ok_or_else(|| AppwriteError::Service {
                code: 401,
                kind: "user_invalid_credentials".to_owned(),
                message: "Invalid credentials.".to_owned(),
            })?;

        let expire = state.tick() + Duration::days(365);
        state.session = Some(account_id.clone());
        Ok(SessionRecord {
            id: format!("session-{account_id}"),
            user_id: account_id,
            expire,
            current: true,
        })
    }

    async fn get(&self) -> Result<AccountRecord> {
        let mut state = self.state();
        state.calls.push(Call::GetAccount);
        state.check(Operation::GetAccount)?;

        let session = state.session.clone();
        session
            .and_then(|account_id| {
                state
                    .accounts
                    .iter()
                    .find(|(account, _)| account.id == account_id)
                    .map(|(account, _)| account.clone())
            })
            .ok_or_else(|| AppwriteError::Service {
                code: 401,
                kind: "general_unauthorized_scope".to_owned(),
                message: "User (role: guests) missing scope (account)".to_owned(),
            })
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteSession {
            session_id: session_id.to_owned(),
        });
        state.check(Operation::DeleteSession)?;

        if session_id != CURRENT_SESSION || state.session.take().is_none() {
            return Err(AppwriteError::not_found(
                "user_session_not_found",
                "The current user session could not be found.",
            ));
        }
        Ok(())
    }
}

impl DatabaseService for MockBackend {
    async fn create_document(
        &self,
        _database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document> {
        let mut state = self.state();
        state.calls.push(Call::CreateDocument {
            collection_id: collection_id.to_owned(),
            document_id: document_id.to_owned(),
            data: data.clone(),
        });
        state.check(Operation::CreateDocument)?;

        let now = state.tick();
        let document = Document {
            id: document_id.to_owned(),
            collection_id: collection_id.to_owned(),
            database_id: Self::resources().database_id,
            created_at: now,
            updated_at: now,
            permissions: Vec::new(),
            data: object(data)?,
        };
        state.collection(collection_id).push(document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        _database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document> {
        let mut state = self.state();
        state.calls.push(Call::GetDocument {
            collection_id: collection_id.to_owned(),
            document_id: document_id.to_owned(),
        });
        state.check(Operation::GetDocument)?;

        state
            .collection(collection_id)
            .iter()
            .find(|document| document.id == document_id)
            .cloned()
            .ok_or_else(|| document_not_found(document_id))
    }

    async fn list_documents(
        &self,
        _database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<DocumentList> {
        let mut state = self.state();
        state.calls.push(Call::ListDocuments {
            collection_id: collection_id.to_owned(),
            queries: queries.to_vec(),
        });
        state.check(Operation::ListDocuments)?;

        let mut documents: Vec<Document> = state
            .collection(collection_id)
            .iter()
            .filter(|document| {
                queries.iter().all(|query| match query {
                    Query::Equal { attribute: name, values } => {
                        attribute(document, name).is_some_and(|value| values.contains(value))
                    }
                    Query::Search {
                        attribute: name,
                        term,
                    } => matches_search(document, name, term),
                    _ => true,
                })
            })
            .cloned()
            .collect();
        let total = documents.len() as u64;

        for query in queries.iter().rev() {
            match query {
                Query::OrderDesc(name) => documents.sort_by(|a, b| compare(b, a, name)),
                Query::OrderAsc(name) => documents.sort_by(|a, b| compare(a, b, name)),
                _ => {}
            }
        }

        for query in queries {
            if let Query::CursorAfter(cursor) = query {
                let position = documents
                    .iter()
                    .position(|document| &document.id == cursor)
                    .ok_or_else(|| AppwriteError::Service {
                        code: 400,
                        kind: "general_argument_invalid".to_owned(),
                        message: format!("Document '{cursor}' for the 'cursor' value not found."),
                    })?;
                documents = documents.split_off(position + 1);
            }
        }

        let limit = queries
            .iter()
            .find_map(|query| match query {
                Query::Limit(limit) => usize::try_from(*limit).ok(),
                _ => None,
            })
            .unwrap_or(DEFAULT_LIST_LIMIT);
        documents.truncate(limit);

        Ok(DocumentList { total, documents })
    }

    async fn update_document(
        &self,
        _database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document> {
        let mut state = self.state();
        state.calls.push(Call::UpdateDocument {
            collection_id: collection_id.to_owned(),
            document_id: document_id.to_owned(),
            data: data.clone(),
        });
        state.check(Operation::UpdateDocument)?;

        let changes = object(data)?;
        let now = state.tick();
        let document = state
            .collection(collection_id)
            .iter_mut()
            .find(|document| document.id == document_id)
            .ok_or_else(|| document_not_found(document_id))?;

        document.data.extend(changes);
        document.updated_at = now;
        Ok(document.clone())
    }

    async fn delete_document(
        &self,
        _database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteDocument {
            collection_id: collection_id.to_owned(),
            document_id: document_id.to_owned(),
        });
        state.check(Operation::DeleteDocument)?;

        let documents = state.collection(collection_id);
        let position = documents
            .iter()
            .position(|document| document.id == document_id)
            .ok_or_else(|| document_not_found(document_id))?;
        documents.remove(position);
        Ok(())
    }
}

impl StorageService for MockBackend {
    async fn create_file(
        &self,
        _bucket_id: &str,
        file_id: &str,
        file: &FileUpload,
    ) -> Result<FileRecord> {
        let mut state = self.state();
        state.calls.push(Call::CreateFile {
            file_id: file_id.to_owned(),
            name: file.name.clone(),
        });
        state.check(Operation::CreateFile)?;

        let record = FileRecord {
            id: file_id.to_owned(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size_original: file.len() as u64,
        };
        state.files.insert(file_id.to_owned(), record.clone());
        Ok(record)
    }

    async fn delete_file(&self, _bucket_id: &str, file_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteFile {
            file_id: file_id.to_owned(),
        });
        state.check(Operation::DeleteFile)?;

        state.files.remove(file_id).map(|_| ()).ok_or_else(|| {
            AppwriteError::not_found(
                "storage_file_not_found",
                "The requested file could not be found.",
            )
        })
    }

    fn file_preview_url(
        &self,
        bucket_id: &str,
        file_id: &str,
        options: &PreviewOptions,
    ) -> Result<Url> {
        self.state().check(Operation::FilePreview)?;

        let mut url = Url::parse(&format!(
            "{MOCK_ENDPOINT}/storage/buckets/{bucket_id}/files/{file_id}/preview"
        ))?;
        url.query_pairs_mut()
            .append_pair("width", &options.width.to_string())
            .append_pair("height", &options.height.to_string())
            .append_pair("gravity", PREVIEW_GRAVITY)
            .append_pair("quality", &options.quality.to_string());
        Ok(url)
    }
}

impl AvatarService for MockBackend {
    fn initials_url(&self, name: &str) -> Result<Url> {
        self.state().check(Operation::InitialsUrl)?;

        let mut url = Url::parse(&format!("{MOCK_ENDPOINT}/avatars/initials"))?;
        url.query_pairs_mut().append_pair("name", name);
        Ok(url)
    }
}
