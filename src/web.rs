//! Transport-free HTTP routing on top of the container.
//!
//! A [Controller] declares its routes, the [Router] mounts the routes of every controller
//! known to a container and dispatches [Request]s to the resolved controller instances.
//! Failing to resolve a controller results in a generic server error response.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, trace};

use crate::provider::Instance;
use crate::{Component, Container, Token};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(format!("unsupported method {}", s)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    body: String,
}

impl Request {
    /// Build a request from a method and a target such as `/users/7?verbose=true`
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, HashMap::new()),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            params: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path parameter captured by the route pattern
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status: 200,
                content_type: "application/json",
                body,
            },
            Err(err) => {
                error!(%err, "cannot serialize response body");
                Self::internal_error()
            }
        }
    }

    pub fn not_found() -> Self {
        Self::with_status(404, "Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::with_status(405, "Method Not Allowed")
    }

    pub fn internal_error() -> Self {
        Self::with_status(500, "Internal Server Error")
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

type Handler<C> = Arc<dyn Fn(&C, &Request) -> Response + Send + Sync>;

/// Route declared by a controller, relative to its base path
pub struct Route<C> {
    method: Method,
    path: String,
    handler: Handler<C>,
}

impl<C: Send + Sync + 'static> Route<C> {
    pub fn new<F>(method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &Request) -> Response + Send + Sync + 'static,
    {
        Self {
            method,
            path: path.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn get<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &Request) -> Response + Send + Sync + 'static,
    {
        Self::new(Method::Get, path, handler)
    }

    pub fn post<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &Request) -> Response + Send + Sync + 'static,
    {
        Self::new(Method::Post, path, handler)
    }

    pub fn put<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &Request) -> Response + Send + Sync + 'static,
    {
        Self::new(Method::Put, path, handler)
    }

    pub fn patch<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &Request) -> Response + Send + Sync + 'static,
    {
        Self::new(Method::Patch, path, handler)
    }

    pub fn delete<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&C, &Request) -> Response + Send + Sync + 'static,
    {
        Self::new(Method::Delete, path, handler)
    }
}

/// A component exposing request handlers
pub trait Controller: Component {
    const BASE_PATH: &'static str = "";

    fn routes() -> Vec<Route<Self>>;
}

pub(crate) struct ErasedRoute {
    method: Method,
    path: String,
    invoke: Arc<dyn Fn(Instance, &Request) -> Response + Send + Sync>,
}

pub(crate) fn erase_routes<T: Controller>() -> Vec<ErasedRoute> {
    T::routes()
        .into_iter()
        .map(|route| {
            let handler = route.handler;
            ErasedRoute {
                method: route.method,
                path: join_paths(T::BASE_PATH, &route.path),
                invoke: Arc::new(move |instance: Instance, request: &Request| {
                    match instance.downcast::<T>() {
                        Ok(controller) => (*handler)(&*controller, request),
                        Err(_) => Response::internal_error(),
                    }
                }),
            }
        })
        .collect()
}

fn join_paths(base: &str, path: &str) -> String {
    let joined = format!(
        "/{}/{}",
        base.trim_matches('/'),
        path.trim_matches('/')
    );
    let segments: Vec<&str> = joined.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Path pattern where `:name` or `{name}` segments capture a parameter
#[derive(Debug)]
struct PathPattern(Vec<Segment>);

impl PathPattern {
    fn parse(pattern: &str) -> Self {
        Self(
            pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|segment| {
                    if let Some(name) = segment.strip_prefix(':') {
                        Segment::Param(name.to_string())
                    } else if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        Segment::Param(name.to_string())
                    } else {
                        Segment::Literal(segment.to_string())
                    }
                })
                .collect(),
        )
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.0.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.0.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

struct MountedRoute {
    route: ErasedRoute,
    pattern: PathPattern,
    token: Token,
    qualifiers: Vec<String>,
}

/// Dispatch requests to the controllers of a container
pub struct Router<'c> {
    container: &'c Container,
    routes: Vec<MountedRoute>,
}

impl<'c> Router<'c> {
    /// Mount the routes of every controller provider of the container
    pub fn from_container(container: &'c Container) -> Self {
        let mut routes = Vec::new();
        for provider in container.providers() {
            let Some(class) = provider.class().filter(|class| class.is_controller()) else {
                continue;
            };
            for route in class.routes() {
                trace!(method = %route.method, path = %route.path, controller = %provider.token(), "mount route");
                routes.push(MountedRoute {
                    pattern: PathPattern::parse(&route.path),
                    route,
                    token: provider.token().clone(),
                    qualifiers: provider.qualifiers().iter().cloned().collect(),
                });
            }
        }
        info!(routes = routes.len(), "router ready");
        Self { container, routes }
    }

    /// Mounted routes, in declaration order
    pub fn routes(&self) -> impl Iterator<Item = (Method, &str)> {
        self.routes
            .iter()
            .map(|mounted| (mounted.route.method, mounted.route.path.as_str()))
    }

    pub fn dispatch(&self, request: &Request) -> Response {
        let mut path_found = false;
        for mounted in &self.routes {
            let Some(params) = mounted.pattern.matches(request.path()) else {
                continue;
            };
            path_found = true;
            if mounted.route.method != request.method() {
                continue;
            }

            let qualifiers: Vec<&str> = mounted.qualifiers.iter().map(String::as_str).collect();
            return match self.container.resolve(&mounted.token, &qualifiers) {
                Ok(controller) => {
                    let request = request.clone().with_params(params);
                    (*mounted.route.invoke)(controller, &request)
                }
                Err(err) => {
                    error!(%err, method = %request.method(), path = %request.path(), "cannot resolve controller");
                    Response::internal_error()
                }
            };
        }
        if path_found {
            Response::method_not_allowed()
        } else {
            Response::not_found()
        }
    }
}
