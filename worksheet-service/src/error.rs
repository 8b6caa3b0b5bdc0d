use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{1}")]
    Server(StatusCode, String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Storage(String),
    // Froms
    #[error("{0}")]
    Worksheet(#[from] worksheet_utils::error::Error),
    #[error("{0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("{0}")]
    Bson(#[from] bson::de::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

/// Flattens an AWS SDK error, including its source chain, into a storage error.
pub fn storage_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Storage(format!(
        "{}",
        aws_sdk_s3::error::DisplayErrorContext(err)
    ))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let msg = self.to_string();
        let status: StatusCode = self.into();

        if status.is_server_error() {
            tracing::error!(%status, "{msg}");
        }

        (status, Json(json!({ "error": msg }))).into_response()
    }
}

impl From<Error> for StatusCode {
    fn from(error: Error) -> Self {
        match error {
            Error::Server(c, _) => c,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Worksheet(worksheet_utils::error::Error::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Error::Storage(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
