use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

/// StoreError
///
/// Failure of the category store collaborator. The core never retries these; they travel
/// unchanged up to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// CategoryError
///
/// Every failure the category services can surface to a client.
#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("You can not search on this criteria: {key}")]
    InvalidCriteria { key: String },

    #[error("You don't have the permissions to search on the \"{key}\" field.")]
    Forbidden { key: String },

    #[error("Context of category {id} is not valid: {cause}")]
    ContextInvalid { id: i64, cause: String },

    #[error("Category {0} does not exist")]
    NotFound(i64),

    #[error("Sorry, but you do not currently have permissions to do that ({0})")]
    MissingCapability(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ErrorResponse
///
/// JSON body returned for every `CategoryError`.
#[derive(Debug, Serialize, serde::Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub errorcode: String,
    pub message: String,
}

impl CategoryError {
    pub fn status(&self) -> StatusCode {
        match self {
            CategoryError::InvalidCriteria { .. } => StatusCode::BAD_REQUEST,
            CategoryError::Forbidden { .. }
            | CategoryError::ContextInvalid { .. }
            | CategoryError::MissingCapability(_) => StatusCode::FORBIDDEN,
            CategoryError::NotFound(_) => StatusCode::NOT_FOUND,
            CategoryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn errorcode(&self) -> &'static str {
        match self {
            CategoryError::InvalidCriteria { .. } | CategoryError::Forbidden { .. } => {
                "criteriaerror"
            }
            CategoryError::ContextInvalid { .. } => "errorcatcontextnotvalid",
            CategoryError::NotFound(_) => "invalidcategoryid",
            CategoryError::MissingCapability(_) => "nopermissions",
            CategoryError::Store(_) => "storeerror",
        }
    }
}

impl IntoResponse for CategoryError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Store details stay in the logs; clients get a generic message.
        let message = match &self {
            CategoryError::Store(e) => {
                tracing::error!("category store failure: {}", e);
                "Internal store error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            errorcode: self.errorcode().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
