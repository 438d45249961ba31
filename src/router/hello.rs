//! Demonstration resource mapping each HTTP verb to a handler.
//!
//! Only `POST` reads the request body.

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::router::Valid;

pub const NAME_MAX_LENGTH: usize = 10;

pub const AN_APIVIEW: [&str; 4] = [
    "Uses HTTP methods as functions (get,post,patch,put,delete)",
    "Is similar to a traditional Django View",
    "Gives you the most control over your application logic",
    "Is mapped manually to URLs",
];

#[derive(Debug, Deserialize)]
pub struct Body {
    /// `None` when absent, `Some(None)` when `null`.
    #[serde(default, deserialize_with = "nullable")]
    pub name: Option<Option<String>>,
}

fn nullable<'de, D>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl Validate for Body {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let issue = match &self.name {
            None => Some(
                ValidationError::new("required")
                    .with_message("This field is required.".into()),
            ),
            Some(None) => Some(
                ValidationError::new("null")
                    .with_message("This field may not be null.".into()),
            ),
            Some(Some(name)) => validate_name(name).err(),
        };

        let mut errors = ValidationErrors::new();
        if let Some(issue) = issue {
            errors.add("name", issue);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Surrounding whitespace is ignored, as it is stripped before greeting.
fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("blank")
            .with_message("This field may not be blank.".into()));
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(ValidationError::new("max_length").with_message(
            "Ensure this field has no more than 10 characters.".into(),
        ));
    }

    Ok(())
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub message: String,
    pub an_apiview: Vec<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub message: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub method: String,
}

impl Acknowledgement {
    fn new(method: &str, id: Option<Path<String>>) -> Json<Self> {
        let id = id.as_deref().map(String::as_str);
        tracing::debug!(method, id, "stub handler called");
        Json(Self {
            method: method.to_owned(),
        })
    }
}

/// Handler to list what the resource does.
pub async fn describe() -> Json<Description> {
    Json(Description {
        message: "Hello".to_owned(),
        an_apiview: AN_APIVIEW.iter().map(|s| (*s).to_owned()).collect(),
    })
}

/// Handler to greet a validated name.
pub async fn greet(Valid(body): Valid<Body>) -> Json<Greeting> {
    // Absent and `null` names were rejected already.
    let name = body.name.flatten().unwrap_or_default();
    let name = name.trim();

    Json(Greeting {
        message: format!("Hello {name}"),
    })
}

/// Handler to update an object. Does nothing.
pub async fn replace(id: Option<Path<String>>) -> Json<Acknowledgement> {
    Acknowledgement::new("PUT", id)
}

/// Handler to partially update an object. Does nothing.
pub async fn modify(id: Option<Path<String>>) -> Json<Acknowledgement> {
    Acknowledgement::new("PATCH", id)
}

/// Handler to delete an object. Does nothing.
pub async fn remove(id: Option<Path<String>>) -> Json<Acknowledgement> {
    Acknowledgement::new("DELETE", id)
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        // `GET /hello-view` goes to `describe`, `POST` to `greet`.
        .route(
            "/",
            get(describe).post(greet).put(replace).patch(modify).delete(remove),
        )
        .route("/{id}", get(describe).put(replace).patch(modify).delete(remove))
}
