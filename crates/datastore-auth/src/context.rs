//! Request view seen by the authorization gate

use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Identity bound into a request once its token has been authorized
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity string
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the identity string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP method, path, headers and path parameters of one request
///
/// Header names are stored lowercased. `identity` stays empty until the
/// gate authorizes the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    method: String,
    path: String,
    headers: BTreeMap<String, String>,
    path_params: Vec<(String, String)>,
    identity: Option<Identity>,
}

impl RequestContext {
    /// Create a context for `method` on `path`
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a matched path parameter
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Request method, uppercase
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Matched path parameters in route order
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Identity bound by the gate, if any
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub(crate) fn bind_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Resource category addressed by this request
    ///
    /// Segments are percent-decoded, then path-parameter values are removed,
    /// then the trailing separator, and the last remaining segment is
    /// returned. `/poi_rating/123` with parameter `poi_id = 123` addresses
    /// `poi_rating`, and so does `/poi_rating/%31%32%33`.
    pub fn target_resource(&self) -> Option<Cow<'_, str>> {
        let mut segments: Vec<Cow<'_, str>> = self
            .path
            .split('/')
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy())
            .collect();
        for (_, value) in &self.path_params {
            if let Some(index) = segments.iter().rposition(|segment| *segment == value.as_str()) {
                segments.remove(index);
            }
        }
        while segments.last().is_some_and(|segment| segment.is_empty()) {
            segments.pop();
        }
        segments.pop().filter(|segment| !segment.is_empty())
    }
}
