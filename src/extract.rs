use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// JSON extractor that reports the path of the offending field on
/// malformed bodies instead of axum's opaque rejection.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read request body: {err}")))?;

        let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
        match serde_path_to_error::deserialize(deserializer) {
            Ok(value) => Ok(Json(value)),
            Err(err) => {
                let path = err.path().to_string();
                if path == "." {
                    Err(AppError::bad_request(format!("invalid request body: {}", err.inner())))
                } else {
                    Err(AppError::bad_request(format!(
                        "invalid request body at `{}`: {}",
                        path,
                        err.inner()
                    )))
                }
            }
        }
    }
}
