//! The per-request output carrier shared by every step of a chain.

use std::fmt::Display;

use http::StatusCode;
use serde::ser::{Error as _, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::response::{IntoResponse, Response};

/// Output fields and reported errors for one request.
///
/// A [`Chain`](crate::Chain) creates one fresh accumulator per request,
/// passes it by `&mut` to each step in turn, and stops as soon as
/// [`err_count`](Self::err_count) is non-zero. Whatever the steps wrote is
/// then serialized, once, as the response body:
///
/// ```json
/// {"data":{"IDSalOrder":"42"},"errors":[],"err_count":0}
/// ```
///
/// Field order in `data` is insertion order.
#[derive(Debug, Default)]
pub struct Accumulator {
    data: Map<String, Value>,
    errors: Vec<String>,
    status: Option<StatusCode>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an output field, replacing any earlier value under `name`.
    pub fn put_data(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }

    /// Merges every field of a serializable struct (or map) into the output.
    ///
    /// Fails without touching the output when `obj` does not serialize to a
    /// JSON object.
    pub fn put_obj<T: Serialize>(&mut self, obj: &T) -> Result<(), serde_json::Error> {
        match serde_json::to_value(obj)? {
            Value::Object(fields) => {
                self.data.extend(fields);
                Ok(())
            }
            other => Err(serde_json::Error::custom(format!(
                "expected an object, got {}",
                kind(&other)
            ))),
        }
    }

    pub fn get_data(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Reports a failure. Any error stops the chain after the current step.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn err_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Unwraps `result`, or records its error message and returns `None`.
    ///
    /// ```rust
    /// # use baton::{Accumulator, RawBody};
    /// # #[derive(serde::Deserialize)] struct Person { #[allow(dead_code)] name: String }
    /// let mut acc = Accumulator::new();
    /// let body = RawBody::from_bytes(&b"{not-json}"[..]);
    /// let person: Option<Person> = acc.report(body.decode_json());
    /// assert!(person.is_none());
    /// assert_eq!(acc.err_count(), 1);
    /// ```
    pub fn report<T, E: Display>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.add_error(e.to_string());
                None
            }
        }
    }

    /// Overrides the status the response is sent with.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// The status the response will carry: the one set explicitly, otherwise
    /// `200 OK` without errors and `400 Bad Request` with errors.
    pub fn status(&self) -> StatusCode {
        match self.status {
            Some(status) => status,
            None if self.has_errors() => StatusCode::BAD_REQUEST,
            None => StatusCode::OK,
        }
    }
}

impl Serialize for Accumulator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Accumulator", 3)?;
        s.serialize_field("data", &self.data)?;
        s.serialize_field("errors", &self.errors)?;
        s.serialize_field("err_count", &self.errors.len())?;
        s.end()
    }
}

/// Consumes the accumulator, so a request's output is serialized only once.
impl IntoResponse for Accumulator {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self) {
            Ok(body) => Response::builder().status(self.status()).json(body),
            Err(e) => {
                tracing::error!("accumulator serialization failed: {e}");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
