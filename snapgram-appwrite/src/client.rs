use crate::{
    config::AppwriteConfig,
    error::{AppwriteError, Result},
    query::Query,
    record::{AccountRecord, Document, DocumentList, ErrorBody, FileRecord, SessionRecord},
    service::{
        AccountService, AvatarService, DatabaseService, PREVIEW_GRAVITY, PreviewOptions,
        StorageService,
    },
};
use reqwest::{
    Method, RequestBuilder, Response, StatusCode,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use snapgram_common::model::{auth::Password, file::FileUpload};
use tracing::{debug, trace};
use url::{ParseError, Url};

pub const PROJECT_HEADER: &str = "X-Appwrite-Project";
pub const UPLOAD_ID_HEADER: &str = "x-appwrite-id";
/// Files larger than this are uploaded in several requests.
pub const CHUNK_SIZE: usize = 5 * 1024 * 1024;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// HTTP implementation of the backend services.
///
/// The session created by [`AccountService::create_email_session`] is kept
/// in the client's cookie store and sent with every later request.
#[derive(Clone, Debug)]
pub struct AppwriteClient {
    http: reqwest::Client,
    endpoint: Url,
    project_id: String,
}

impl AppwriteClient {
    pub fn new(config: &AppwriteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(concat!("snapgram/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_http_client(
            http,
            config.url.clone(),
            config.project_id.clone(),
        ))
    }

    #[must_use]
    pub fn with_http_client(http: reqwest::Client, endpoint: Url, project_id: String) -> Self {
        Self {
            http,
            endpoint,
            project_id,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn documents_url(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: Option<&str>,
    ) -> Result<Url> {
        let mut segments = vec![
            "databases",
            database_id,
            "collections",
            collection_id,
            "documents",
        ];
        segments.extend(document_id);

        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!(%method, %url, "Sending request");
        self.http
            .request(method, url)
            .header(PROJECT_HEADER, &self.project_id)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(request: RequestBuilder) -> Result<()> {
        Self::checked(request.send().await?).await?;
        Ok(())
    }

    async fn checked(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await?;
        Err(service_error(status, &body))
    }

    /// Sends chunk `index` of `file`. Files above [`CHUNK_SIZE`] carry a
    /// content range, and every chunk after the first names the upload.
    async fn upload_chunk(
        &self,
        url: &Url,
        file_id: &str,
        file: &FileUpload,
        index: usize,
        chunk: &[u8],
    ) -> Result<FileRecord> {
        let form = Form::new()
            .text("fileId", file_id.to_owned())
            .part("file", Self::file_part(file, chunk.to_vec())?);
        let mut request = self.request(Method::POST, url.clone());

        let total = file.len();
        if total > CHUNK_SIZE {
            let start = index * CHUNK_SIZE;
            let end = start + chunk.len() - 1;
            debug!(file_id, start, end, total, "Uploading file chunk");

            request = request.header("content-range", format!("bytes {start}-{end}/{total}"));
            if index > 0 {
                request = request.header(UPLOAD_ID_HEADER, file_id);
            }
        }

        Self::send(request.multipart(form)).await
    }

    fn file_part(file: &FileUpload, bytes: Vec<u8>) -> Result<Part> {
        let mime_type = if file.mime_type.is_empty() {
            FALLBACK_MIME_TYPE
        } else {
            &file.mime_type
        };

        Ok(Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str(mime_type)?)
    }
}

/// Builds the error for a failed response from its status and body.
fn service_error(status: StatusCode, body: &str) -> AppwriteError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => AppwriteError::Service {
            code: status.as_u16(),
            kind: error.kind,
            message: error.message,
        },
        Err(_) => AppwriteError::Service {
            code: status.as_u16(),
            kind: "unknown".to_owned(),
            message: body.to_owned(),
        },
    }
}

impl AccountService for AppwriteClient {
    async fn create(
        &self,
        account_id: &str,
        email: &str,
        password: &Password,
        name: &str,
    ) -> Result<AccountRecord> {
        let body = json!({
            "userId": account_id,
            "email": email,
            "password": password.expose(),
            "name": name,
        });

        Self::send(self.request(Method::POST, self.url(&["account"])?).json(&body)).await
    }

    async fn create_email_session(&self, email: &str, password: &Password) -> Result<SessionRecord> {
        let body = json!({
            "email": email,
            "password": password.expose(),
        });
        let url = self.url(&["account", "sessions", "email"])?;

        Self::send(self.request(Method::POST, url).json(&body)).await
    }

    async fn get(&self) -> Result<AccountRecord> {
        Self::send(self.request(Method::GET, self.url(&["account"])?)).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.url(&["account", "sessions", session_id])?;
        Self::send_empty(self.request(Method::DELETE, url)).await
    }
}

impl DatabaseService for AppwriteClient {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document> {
        let url = self.documents_url(database_id, collection_id, None)?;
        let body = json!({
            "documentId": document_id,
            "data": data,
        });

        Self::send(self.request(Method::POST, url).json(&body)).await
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document> {
        let url = self.documents_url(database_id, collection_id, Some(document_id))?;
        Self::send(self.request(Method::GET, url)).await
    }

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<DocumentList> {
        let mut url = self.documents_url(database_id, collection_id, None)?;
        {
            let mut pairs = url.query_pairs_mut();
            for query in queries {
                pairs.append_pair("queries[]", &query.to_query_string()?);
            }
        }

        Self::send(self.request(Method::GET, url)).await
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document> {
        let url = self.documents_url(database_id, collection_id, Some(document_id))?;
        let body = json!({ "data": data });

        Self::send(self.request(Method::PATCH, url).json(&body)).await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<()> {
        let url = self.documents_url(database_id, collection_id, Some(document_id))?;
        Self::send_empty(self.request(Method::DELETE, url)).await
    }
}

impl StorageService for AppwriteClient {
    async fn create_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: &FileUpload,
    ) -> Result<FileRecord> {
        let url = self.url(&["storage", "buckets", bucket_id, "files"])?;

        // An empty file is still sent as one empty chunk.
        let mut chunks = file.bytes.chunks(CHUNK_SIZE);
        let first = chunks.next().unwrap_or_default();
        let mut record = self.upload_chunk(&url, file_id, file, 0, first).await?;
        for (index, chunk) in chunks.enumerate() {
            record = self
                .upload_chunk(&url, file_id, file, index + 1, chunk)
                .await?;
        }

        Ok(record)
    }

    async fn delete_file(&self, bucket_id: &str, file_id: &str) -> Result<()> {
        let url = self.url(&["storage", "buckets", bucket_id, "files", file_id])?;
        Self::send_empty(self.request(Method::DELETE, url)).await
    }

    fn file_preview_url(
        &self,
        bucket_id: &str,
        file_id: &str,
        options: &PreviewOptions,
    ) -> Result<Url> {
        let mut url = self.url(&["storage", "buckets", bucket_id, "files", file_id, "preview"])?;
        url.query_pairs_mut()
            .append_pair("width", &options.width.to_string())
            .append_pair("height", &options.height.to_string())
            .append_pair("gravity", PREVIEW_GRAVITY)
            .append_pair("quality", &options.quality.to_string())
            .append_pair("project", &self.project_id);

        Ok(url)
    }
}

impl AvatarService for AppwriteClient {
    fn initials_url(&self, name: &str) -> Result<Url> {
        let mut url = self.url(&["avatars", "initials"])?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("project", &self.project_id);

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        client::{AppwriteClient, CHUNK_SIZE, UPLOAD_ID_HEADER, service_error},
        error::{AppwriteError, ErrorKind},
        service::{AvatarService, PreviewOptions, StorageService},
    };
    use reqwest::StatusCode;
    use serde_json::json;
    use snapgram_common::model::file::FileUpload;
    use wiremock::{
        Mock, MockServer, Request, ResponseTemplate,
        matchers::{header_exists, method, path},
    };

    const FILES_PATH: &str = "/v1/storage/buckets/media/files";

    fn file_response(name: &str, size: usize) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_json(json!({
            "$id": "f1",
            "bucketId": "media",
            "name": name,
            "mimeType": "image/png",
            "sizeOriginal": size,
            "chunksTotal": 3,
        }))
    }

    fn header(request: &Request, name: &str) -> Option<String> {
        request
            .headers
            .get(name)
            .map(|value| value.to_str().unwrap().to_owned())
    }

    async fn uploaded_requests(size: usize) -> (String, Vec<Request>) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FILES_PATH))
            .and(header_exists(UPLOAD_ID_HEADER))
            .respond_with(file_response("last", size))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(FILES_PATH))
            .respond_with(file_response("first", size))
            .mount(&server)
            .await;

        let file = FileUpload::new("photo.png", "image/png", vec![7; size]);
        let record = client(&format!("{}/v1", server.uri()))
            .create_file("media", "f1", &file)
            .await
            .unwrap();
        assert_eq!(record.id, "f1");
        assert_eq!(record.size_original, size as u64);

        (record.name, server.received_requests().await.unwrap())
    }

    fn client(endpoint: &str) -> AppwriteClient {
        AppwriteClient::with_http_client(
            reqwest::Client::new(),
            endpoint.parse().unwrap(),
            "snapgram".to_owned(),
        )
    }

    #[test]
    fn joins_segments_onto_endpoint() {
        for endpoint in ["https://cloud.appwrite.io/v1", "https://cloud.appwrite.io/v1/"] {
            let url = client(endpoint)
                .documents_url("db", "posts", Some("p1"))
                .unwrap();
            assert_eq!(
                url.as_str(),
                "https://cloud.appwrite.io/v1/databases/db/collections/posts/documents/p1"
            );
        }
    }

    #[test]
    fn preview_url() {
        let url = client("https://cloud.appwrite.io/v1")
            .file_preview_url("media", "f1", &PreviewOptions::default())
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://cloud.appwrite.io/v1/storage/buckets/media/files/f1/preview\
             ?width=2000&height=2000&gravity=top&quality=100&project=snapgram"
        );
    }

    #[test]
    fn initials_url_encodes_name() {
        let url = client("https://cloud.appwrite.io/v1")
            .initials_url("Ada Lovelace")
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://cloud.appwrite.io/v1/avatars/initials?name=Ada+Lovelace&project=snapgram"
        );
    }

    #[test]
    fn error_bodies() {
        let error = service_error(
            StatusCode::NOT_FOUND,
            r#"{"message":"Document with the requested ID could not be found.","code":404,"type":"document_not_found","version":"1.5.7"}"#,
        );
        assert!(matches!(
            &error,
            AppwriteError::Service { code: 404, kind, .. } if kind == "document_not_found"
        ));
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let error = service_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            error,
            AppwriteError::Service { code: 502, message, .. } if message == "upstream down"
        ));
    }

    #[tokio::test]
    async fn large_upload_returns_last_chunk_record() {
        let size = 2 * CHUNK_SIZE + 1;
        let (name, requests) = uploaded_requests(size).await;

        assert_eq!(name, "last");
        let ranges: Vec<_> = requests
            .iter()
            .map(|request| header(request, "content-range"))
            .collect();
        assert_eq!(
            ranges,
            [
                Some("bytes 0-5242879/10485761".to_owned()),
                Some("bytes 5242880-10485759/10485761".to_owned()),
                Some("bytes 10485760-10485760/10485761".to_owned()),
            ]
        );
        let upload_ids: Vec<_> = requests
            .iter()
            .map(|request| header(request, UPLOAD_ID_HEADER))
            .collect();
        assert_eq!(upload_ids, [None, Some("f1".to_owned()), Some("f1".to_owned())]);
    }

    #[tokio::test]
    async fn small_upload_is_one_request() {
        for size in [0, 1024, CHUNK_SIZE] {
            let (name, requests) = uploaded_requests(size).await;

            assert_eq!(name, "first");
            assert_eq!(requests.len(), 1);
            assert_eq!(header(&requests[0], "content-range"), None);
            assert_eq!(header(&requests[0], UPLOAD_ID_HEADER), None);
        }
    }
}
