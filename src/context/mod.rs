//! Per-request context handed to route handlers and middleware.

use serde::de::DeserializeOwned;

use crate::Request;

/// Per-request context.
///
/// Wraps the parsed [`Request`] so middleware can inspect it and handlers can
/// decode its body.
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// Decodes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
