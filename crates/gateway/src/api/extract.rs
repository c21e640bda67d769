//! `ValidJson<T>` extractor: a JSON body whose rejections use the
//! structured validation error body instead of axum's plain text.

use async_trait::async_trait;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;

use ck_domain::error::Error;

use super::error::ApiError;
use crate::state::AppState;

pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T> FromRequest<AppState> for ValidJson<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(ApiError(Error::Validation(vec![rejection.body_text()]))),
        }
    }
}
