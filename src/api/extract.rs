//! Request extractors that reject with the API's JSON error body.

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use super::{ApiError, api_error};

/// `Json<T>` whose rejections are `{"error": {"code": "invalid_input", ...}}`
/// with status 400 instead of axum's plain-text body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
                Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_input",
                    rejection.body_text(),
                ))
            }
        }
    }
}
