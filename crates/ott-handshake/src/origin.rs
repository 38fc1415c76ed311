//! Widget endpoint and origin validation.
//!
//! Origins are always derived by URL parsing (scheme, host and port, serialized
//! the way browsers serialize them) and compared by exact string equality.
//! There is no prefix, suffix or wildcard matching anywhere in this module.

use crate::error::EndpointError;
use url::Url;

/// The embedded widget's identity, fixed for one host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetEndpoint {
    widget_id: String,
    embed_url: Url,
    origin: String,
}

impl WidgetEndpoint {
    /// Build an endpoint from a widget identifier and the frame URL.
    ///
    /// Malformed URLs, non-http(s) schemes and opaque origins are rejected here
    /// so that no later comparison ever runs against a bad expected origin.
    pub fn new(widget_id: impl Into<String>, embed_url: &str) -> Result<Self, EndpointError> {
        let widget_id = widget_id.into();
        if widget_id.trim().is_empty() {
            return Err(EndpointError::EmptyWidgetId);
        }

        let embed_url = Url::parse(embed_url)?;
        let origin = origin_of(&embed_url)?;

        Ok(Self {
            widget_id,
            embed_url,
            origin,
        })
    }

    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    /// The full frame URL. May carry query parameters; do not log it.
    pub fn embed_url(&self) -> &Url {
        &self.embed_url
    }

    /// The expected widget origin, computed once at construction.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Serialize the origin of an http(s) URL (`scheme://host[:port]`).
///
/// Default ports are omitted, matching browser origin serialization.
pub fn origin_of(url: &Url) -> Result<String, EndpointError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    }

    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(EndpointError::OpaqueOrigin(url.to_string()));
    }
    Ok(origin.ascii_serialization())
}

/// Normalize a configured host origin, rejecting anything that is not a bare
/// origin. A single trailing slash is tolerated.
pub fn normalize_origin(raw: &str) -> Result<String, EndpointError> {
    let url = Url::parse(raw.trim())?;
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(EndpointError::NotAnOrigin(raw.to_string()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(EndpointError::NotAnOrigin(raw.to_string()));
    }
    origin_of(&url)
}

/// Returns true only if `candidate_origin` is exactly the endpoint's origin.
pub fn is_trusted(candidate_origin: &str, endpoint: &WidgetEndpoint) -> bool {
    candidate_origin == endpoint.origin()
}
