//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe requests and transport outcomes as plain data. The
//! core never touches the network: an [`HttpExecutor`] supplied by the caller
//! performs the round-trip and reports back through a
//! [`CompletionHandle`](crate::operation::CompletionHandle).
//!
//! All fields use owned types (`String`, `Vec`) so values can cross FFI
//! boundaries without lifetime concerns.

use std::fmt;

use crate::error::{InvalidArgument, TransportError};
use crate::operation::CompletionHandle;

/// HTTP method for a request.
///
/// `Extension` carries any other method token (e.g. `PROPFIND`). It is
/// checked by [`RequestDescriptor::validate`], not at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Extension(String),
}

impl HttpMethod {
    /// Parse a method token. Known methods are matched case-sensitively, as
    /// HTTP method names are.
    pub fn parse(token: &str) -> Result<Self, InvalidArgument> {
        let method = match token {
            "" => return Err(InvalidArgument::EmptyMethod),
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "OPTIONS" => HttpMethod::Options,
            other => HttpMethod::Extension(other.to_string()),
        };
        method.check()?;
        Ok(method)
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Extension(token) => token,
        }
    }

    fn check(&self) -> Result<(), InvalidArgument> {
        let HttpMethod::Extension(token) = self else {
            return Ok(());
        };
        if token.is_empty() {
            return Err(InvalidArgument::EmptyMethod);
        }
        // RFC 9110 token characters.
        let valid = token.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        });
        if valid {
            Ok(())
        } else {
            Err(InvalidArgument::InvalidMethod(token.clone()))
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// Built by the caller and handed to a `TypedRequestOperation`, which never
/// mutates it. The executor receives a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RequestDescriptor {
    /// Build a descriptor without headers or body. Call [`validate`] (or let
    /// the operation do it) before use.
    ///
    /// [`validate`]: RequestDescriptor::validate
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup; returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Check that the method is a non-empty token and the URL is an absolute
    /// `http` or `https` URL with a host.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        self.method.check()?;

        let invalid = |reason: &str| InvalidArgument::InvalidUrl {
            url: self.url.clone(),
            reason: reason.to_string(),
        };
        let parsed = url::Url::parse(&self.url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        Ok(())
    }
}

/// Status and headers of a response that made it through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Media type of the `Content-Type` header, lowercased and without
    /// parameters.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Statuses of 400 and above are errors; everything else counts as
    /// success.
    pub fn is_error_status(&self) -> bool {
        self.status >= 400
    }
}

/// What the executor reports when a request finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// A response arrived and its body was read to completion.
    Response {
        metadata: ResponseMetadata,
        body: Vec<u8>,
    },
    /// No usable response: connect, DNS, TLS, timeout, reset, ...
    Failed(TransportError),
}

impl TransportOutcome {
    pub fn response(metadata: ResponseMetadata, body: impl Into<Vec<u8>>) -> Self {
        TransportOutcome::Response {
            metadata,
            body: body.into(),
        }
    }
}

/// The external HTTP client.
///
/// `execute` must return promptly and arrange for exactly one call to
/// [`CompletionHandle::complete`], on whatever thread the implementation
/// chooses. Retries, redirects and timeouts all live behind this trait.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: RequestDescriptor, completion: CompletionHandle);
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
