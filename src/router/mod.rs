//! Request routing: map exact (method, path) pairs to handler functions.
//!
//! Matching is literal: `/set` does not match `/set/` or `/SET`, and the
//! query string plays no part. Requests that match no route are answered
//! with `404 Not Found` and the plain-text body `Not Found`.
//!
//! Every request, matched or not, runs through the middleware stack
//! registered with [`Router::layer`], outermost first.

use std::sync::Arc;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async route handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response>` that
/// is `Send + Sync + 'static`, so route registration takes plain closures.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self)(ctx))
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> bool {
        &self.method == method && self.path == path
    }
}

/// The response for requests no route accepts.
pub fn not_found() -> Response {
    Response::new(StatusCode::NotFound).body("Not Found")
}

/// HTTP request router.
///
/// Routes are evaluated in registration order and the first exact match wins.
///
/// # Examples
///
/// ```rust,no_run
/// use kvedge::{Response, Router, StatusCode, context::Context};
///
/// let mut router = Router::new();
/// router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok).body("{}") });
/// router.post("/set", |_ctx: Context| async { Response::new(StatusCode::Ok) });
/// ```
pub struct Router {
    routes: Vec<Route>,
    middleware: Vec<MiddlewareHandler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Register a handler for `GET` requests to exactly `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests to exactly `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: path.to_owned(),
            handler,
        });
    }

    /// Append a middleware. The first one added is the outermost.
    pub fn layer<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.middleware.push(from_middleware(Arc::new(middleware)));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` to the first matching route, or to the 404 fallback.
    pub async fn route(&self, request: Request) -> Response {
        let handler = self
            .routes
            .iter()
            .find(|route| route.matches(request.method(), request.path()))
            .map(|route| Arc::clone(&route.handler));

        let endpoint: MiddlewareHandler = match handler {
            Some(handler) => Arc::new(move |ctx: Context, _next: Next| handler(ctx)),
            None => Arc::new(|_ctx: Context, _next: Next| {
                Box::pin(async { not_found() }) as BoxFuture
            }),
        };

        let chain: Arc<[MiddlewareHandler]> = self
            .middleware
            .iter()
            .cloned()
            .chain(std::iter::once(endpoint))
            .collect();

        Next::new(chain).run(Context::new(request)).await
    }
}
