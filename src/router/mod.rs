//! HTTP routes.
pub mod hello;
pub mod status;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::ServerError;

/// JSON object body that passed its [`Validate`] rules.
///
/// Arrays and scalars are rejected before `T` is deserialized, since a
/// derived `Deserialize` also accepts a struct written as a sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(object) =
            Json::<Map<String, Value>>::from_request(req, state).await?;
        let value: T = serde_json::from_value(Value::Object(object))?;
        value.validate()?;
        Ok(Valid(value))
    }
}
