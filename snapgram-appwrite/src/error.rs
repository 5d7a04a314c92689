use crate::record::DocumentDataError;
use snapgram_common::model::{Id, ModelValidationError, user::AccountMarker};
use thiserror::Error;

pub type Result<T, E = AppwriteError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("Request to Appwrite failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Appwrite responded with {code} ({kind}): {message}")]
    Service {
        code: u16,
        kind: String,
        message: String,
    },
    #[error("Appwrite returned an invalid document: {0}")]
    Data(#[from] DocumentDataError),
    #[error("Could not encode document data: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("The configured endpoint cannot be used as a base URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error(transparent)]
    Model(#[from] ModelValidationError),
    #[error("No user document belongs to account {0}")]
    UserNotFound(Id<AccountMarker>),
    #[error("A required id was empty")]
    EmptyId,
}

/// Coarse failure classes callers can branch on.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ErrorKind {
    /// The request did not complete or the service rejected it.
    Remote,
    /// The requested document, file or session does not exist.
    NotFound,
    /// The request was refused before reaching the service.
    Logical,
    /// The service answered with data that does not fit the model.
    Data,
}

impl AppwriteError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppwriteError::Service { code: 404, .. } | AppwriteError::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            AppwriteError::Http(_) | AppwriteError::Service { .. } => ErrorKind::Remote,
            AppwriteError::Data(_) => ErrorKind::Data,
            AppwriteError::Encode(_)
            | AppwriteError::InvalidEndpoint(_)
            | AppwriteError::Model(_)
            | AppwriteError::EmptyId => ErrorKind::Logical,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn not_found(kind: &str, message: impl Into<String>) -> Self {
        AppwriteError::Service {
            code: 404,
            kind: kind.to_owned(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{AppwriteError, ErrorKind};
    use snapgram_common::model::Id;

    #[test]
    fn kinds() {
        assert_eq!(
            AppwriteError::not_found("document_not_found", "gone").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AppwriteError::Service {
                code: 401,
                kind: "user_unauthorized".to_owned(),
                message: "no session".to_owned(),
            }
            .kind(),
            ErrorKind::Remote
        );
        assert!(AppwriteError::UserNotFound(Id::new("acc")).is_not_found());
        assert_eq!(AppwriteError::EmptyId.kind(), ErrorKind::Logical);
    }
}
