use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use herald_core::HeraldError;
use serde_json::{json, Value};
use tracing::{debug, error};

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = Result<T, ApiError>;

/// Map a subsystem error to its HTTP status and `{error, message}` body.
pub fn api_error(e: impl Into<HeraldError>) -> ApiError {
    let e = e.into();
    let status = match &e {
        HeraldError::Validation(_) | HeraldError::UnknownProvider { .. } => StatusCode::BAD_REQUEST,
        HeraldError::NotFound { .. } => StatusCode::NOT_FOUND,
        HeraldError::PublishFailed(_) => StatusCode::BAD_GATEWAY,
        HeraldError::Config(_)
        | HeraldError::Database(_)
        | HeraldError::Serialization(_)
        | HeraldError::Io(_)
        | HeraldError::Internal(_) => {
            error!(code = e.code(), "request failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(json!({ "error": e.code(), "message": e.to_string() })),
    )
}

pub fn validation(msg: impl Into<String>) -> ApiError {
    api_error(HeraldError::Validation(msg.into()))
}

/// `Json` extractor whose rejections use the `{error, message}` body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(status = rejection.status().as_u16(), "rejected JSON body");
                Err(validation(rejection.body_text()))
            }
        }
    }
}
