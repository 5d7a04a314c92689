use crate::keys::QueryKey;
use snapgram_appwrite::{AppwriteError, ErrorKind};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Failure of a query or mutation.
///
/// Remote errors are shared: every caller joined on the same in-flight
/// fetch observes the same error.
#[derive(Clone, Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Remote(Arc<AppwriteError>),
    #[error("Data cached under {0} has an unexpected type")]
    DataType(QueryKey),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Remote(err) => err.kind(),
            QueryError::DataType(_) => ErrorKind::Data,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn remote(&self) -> Option<&AppwriteError> {
        match self {
            QueryError::Remote(err) => Some(err),
            QueryError::DataType(_) => None,
        }
    }
}

impl From<AppwriteError> for QueryError {
    fn from(err: AppwriteError) -> Self {
        QueryError::Remote(Arc::new(err))
    }
}

impl From<Arc<AppwriteError>> for QueryError {
    fn from(err: Arc<AppwriteError>) -> Self {
        QueryError::Remote(err)
    }
}
