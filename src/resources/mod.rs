//! Resource clients
//!
//! A [`ResourceClient`] is a CRUD façade over one API collection, built on
//! the shared [`RequestExecutor`]. Entities describe their collection
//! through the [`Resource`] trait.

mod post;
mod user;

pub use post::Post;
pub use user::{Address, Company, Geo, User};

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::common::{Error, Result};
use crate::http::{extract_as, join_path, validate_status, Exchange, RequestExecutor, Response};

/// Status expected from a successful create
pub const STATUS_CREATED: u16 = 201;
/// Status expected from successful reads, updates and deletes
pub const STATUS_OK: u16 = 200;

/// Wire fields assigned by the server, never compared against the submission
pub const SERVER_ASSIGNED_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];

/// An API entity living under one collection endpoint
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    /// Collection path, e.g. `/users`
    const ENDPOINT: &'static str;
    /// Singular name used in logs
    const NAME: &'static str;

    /// Server-assigned identity; `None` until the create response arrives
    fn id(&self) -> Option<i64>;
}

/// Result of a best-effort existence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistenceProbe {
    /// The fetch succeeded
    Found,
    /// The server answered with a non-success status
    Absent { status: u16 },
    /// No answer: transport failure
    ProbeFailed { reason: String },
}

impl ExistenceProbe {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Found)
    }
}

/// Compare every field the caller submitted against the server's echo
///
/// Null/absent submitted fields and server-assigned fields are skipped.
/// Nested objects are compared leaf by leaf, so extra fields the server
/// fills in are ignored. The first differing field is reported by its
/// dotted path, e.g. `address.city`.
pub fn check_echoed_fields<T: Serialize>(submitted: &T, echoed: &T) -> Result<()> {
    let submitted = serde_json::to_value(submitted)?;
    let echoed = serde_json::to_value(echoed)?;
    let (Some(submitted), Some(echoed)) = (submitted.as_object(), echoed.as_object()) else {
        return Err(Error::Assertion(
            "entities must serialize to JSON objects".to_string(),
        ));
    };

    for (field, expected) in submitted {
        if SERVER_ASSIGNED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        compare_submitted(field, expected, echoed.get(field))?;
    }
    Ok(())
}

fn compare_submitted(path: &str, expected: &Value, actual: Option<&Value>) -> Result<()> {
    let actual = actual.unwrap_or(&Value::Null);
    match (expected, actual) {
        (Value::Null, _) => Ok(()),
        (Value::Object(fields), Value::Object(echoed)) => {
            for (name, value) in fields {
                compare_submitted(&format!("{path}.{name}"), value, echoed.get(name))?;
            }
            Ok(())
        }
        _ if expected == actual => Ok(()),
        _ => Err(Error::field_mismatch(path, expected, actual)),
    }
}

/// CRUD client for one resource type
pub struct ResourceClient<R> {
    executor: RequestExecutor,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for ResourceClient<R> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> ResourceClient<R> {
    pub fn new(executor: RequestExecutor) -> Self {
        Self {
            executor,
            _resource: PhantomData,
        }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn item_endpoint(id: i64) -> String {
        join_path(R::ENDPOINT, &[&id.to_string()])
    }

    pub fn list(&self) -> Result<Response> {
        self.executor.get(R::ENDPOINT)
    }

    pub fn get(&self, id: i64) -> Result<Response> {
        self.executor.get(&Self::item_endpoint(id))
    }

    pub fn create(&self, entity: &R) -> Result<Response> {
        self.executor.post(R::ENDPOINT, entity)
    }

    /// Full replacement (PUT)
    pub fn update(&self, id: i64, entity: &R) -> Result<Response> {
        self.executor.put(&Self::item_endpoint(id), entity)
    }

    /// Partial update (PATCH); absent fields are left untouched server-side
    pub fn patch<P: Serialize + ?Sized>(&self, id: i64, changes: &P) -> Result<Response> {
        self.executor.patch(&Self::item_endpoint(id), changes)
    }

    pub fn delete(&self, id: i64) -> Result<Response> {
        self.executor.delete(&Self::item_endpoint(id))
    }

    /// GET the collection with a single query filter
    pub fn filter(&self, name: &str, value: impl ToString) -> Result<Response> {
        self.executor
            .execute(Exchange::get(R::ENDPOINT).query(name, value))
    }

    pub fn list_as_objects(&self) -> Result<Vec<R>> {
        let response = self.list()?;
        validate_status(&response, STATUS_OK)?;
        extract_as(&response)
    }

    pub fn get_as_object(&self, id: i64) -> Result<R> {
        let response = self.get(id)?;
        validate_status(&response, STATUS_OK)?;
        extract_as(&response)
    }

    /// Create, expect 201, decode, and check the echo field by field
    ///
    /// The created entity must carry a server-assigned id.
    pub fn create_and_validate(&self, entity: &R) -> Result<R> {
        let response = self.create(entity)?;
        validate_status(&response, STATUS_CREATED)?;
        let created: R = extract_as(&response)?;

        check_echoed_fields(entity, &created)?;
        let Some(id) = created.id() else {
            return Err(Error::FieldMismatch {
                field: "id".to_string(),
                expected: "server-assigned id".to_string(),
                actual: "null".to_string(),
            });
        };

        tracing::info!(resource = R::NAME, id, "Creation validation passed");
        Ok(created)
    }

    pub fn update_and_validate(&self, id: i64, entity: &R) -> Result<R> {
        let response = self.update(id, entity)?;
        validate_status(&response, STATUS_OK)?;
        let updated: R = extract_as(&response)?;
        check_echoed_fields(entity, &updated)?;
        tracing::info!(resource = R::NAME, id, "Update validation passed");
        Ok(updated)
    }

    pub fn delete_and_validate(&self, id: i64) -> Result<()> {
        let response = self.delete(id)?;
        validate_status(&response, STATUS_OK)?;
        tracing::info!(resource = R::NAME, id, "Deletion validation passed");
        Ok(())
    }

    /// Fetch by id and classify the outcome; never fails
    pub fn probe(&self, id: i64) -> ExistenceProbe {
        match self.get(id) {
            Ok(response) if response.is_success() => ExistenceProbe::Found,
            Ok(response) => ExistenceProbe::Absent {
                status: response.status(),
            },
            Err(e) => {
                tracing::debug!(resource = R::NAME, id, error = %e, "Existence probe failed");
                ExistenceProbe::ProbeFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Best-effort existence check: any failure reads as "does not exist"
    pub fn exists(&self, id: i64) -> bool {
        self.probe(id).exists()
    }
}

impl ResourceClient<User> {
    /// Search users by name (`?name=`)
    pub fn search_by_name(&self, name: &str) -> Result<Response> {
        self.filter("name", name)
    }
}

impl ResourceClient<Post> {
    /// Posts written by one user (`?userId=`)
    pub fn by_user_id(&self, user_id: i64) -> Result<Response> {
        self.filter("userId", user_id)
    }
}
