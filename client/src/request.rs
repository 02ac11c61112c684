//! Request description and response classification.

use reqwest::{Method, Response};

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Whether a request carries the session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// Send `Authorization: Bearer <token>` when a credential is held.
    Bearer,
    /// Never send an authorization header.
    Anonymous,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` pairs, encoded at send time.
    Form(Vec<(&'static str, String)>),
}

impl RequestBody {
    pub(crate) fn encode_form(pairs: &[(&'static str, String)]) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

/// One call against the board service.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub auth: Auth,
    /// Shown when an error response has no usable `detail`.
    pub failure: &'static str,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>, failure: &'static str) -> Self {
        Self {
            method,
            path: path.into(),
            auth: Auth::Bearer,
            failure,
        }
    }

    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.auth = Auth::Anonymous;
        self
    }
}

/// Pull the string `detail` out of an error body.
///
/// A body that is not JSON and a JSON body whose `detail` is missing or not a
/// string (FastAPI validation errors use a list) both yield `None`.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let payload: serde_json::Value = serde_json::from_str(body).ok()?;
    payload
        .get("detail")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}

pub(crate) async fn read_capped_error_body(response: Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            break;
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
