//! Route metadata.
//!
//! A [`RouteDescriptor`] describes how an action is reached (method and URL
//! template) and where each of its parameters is bound from. It is produced
//! by whatever declares the actions; the pipeline only reads it.

use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{TrellisError, TrellisResult};

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Target type of a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Any string.
    String,
    /// A signed 64-bit integer.
    Integer,
    /// A finite floating point number.
    Float,
    /// `true`/`false` (case-insensitive), `1`/`0`.
    Boolean,
    /// An arbitrary JSON document.
    Json,
    /// Every value of a multi-valued source, each converted to the inner type.
    List(Box<ParameterType>),
}

/// A named, typed parameter of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name, matched against the binding source.
    pub name: String,
    /// Target type.
    pub parameter_type: ParameterType,
    /// Whether the parameter may be absent.
    pub optional: bool,
}

impl ParameterDescriptor {
    /// A required parameter.
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            optional: false,
        }
    }

    /// A required string parameter.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String)
    }

    /// Marks the parameter optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Parameter(String),
    Wildcard(String),
}

/// A URL template such as `/users/{id}/files/{*path}`.
///
/// `{name}` matches one path segment; `{*name}` as the last segment matches
/// the remainder of the path. Literal segments match case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parses a template.
    pub fn parse(template: &str) -> TrellisResult<Self> {
        let invalid = |reason: &str| {
            TrellisError::configuration(format!("invalid url template '{template}': {reason}"))
        };

        let raw: Vec<&str> = template
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let mut segments = Vec::with_capacity(raw.len());
        for (index, segment) in raw.iter().enumerate() {
            if let Some(inner) = segment.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .ok_or_else(|| invalid("unclosed parameter"))?;
                if let Some(rest) = name.strip_prefix('*') {
                    if index + 1 != raw.len() {
                        return Err(invalid("wildcard must be the last segment"));
                    }
                    segments.push(Segment::Wildcard(validate_name(rest).map_err(invalid)?));
                } else {
                    segments.push(Segment::Parameter(validate_name(name).map_err(invalid)?));
                }
            } else if segment.contains(['{', '}']) {
                return Err(invalid("parameters must span a whole segment"));
            } else {
                segments.push(Segment::Literal((*segment).to_string()));
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Names of the parameters in template order.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Parameter(name) | Segment::Wildcard(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches `path`, returning the percent-decoded parameter values.
    pub fn match_path(&self, path: &str) -> Option<UrlParameters> {
        let mut parts = path.trim_matches('/').split('/').filter(|p| !p.is_empty());
        let mut parameters = UrlParameters::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if !parts.next()?.eq_ignore_ascii_case(literal) {
                        return None;
                    }
                }
                Segment::Parameter(name) => {
                    parameters.push(name.clone(), decode(parts.next()?));
                }
                Segment::Wildcard(name) => {
                    let rest: Vec<String> = parts.by_ref().map(decode).collect();
                    parameters.push(name.clone(), rest.join("/"));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(parameters)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn validate_name(name: &str) -> Result<String, &'static str> {
    if name.is_empty() {
        return Err("empty parameter name");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("parameter names may only contain letters, digits and '_'");
    }
    Ok(name.to_string())
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |decoded| decoded.into_owned())
}

/// Parameter values matched from the URL path.
///
/// Names compare case-insensitively.
///
/// # Example
///
/// ```rust
/// use trellis_core::route::UrlTemplate;
///
/// let template = UrlTemplate::parse("/users/{userId}").unwrap();
/// let params = template.match_path("/users/42").unwrap();
/// assert_eq!(params.get("userid"), Some("42"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlParameters {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl UrlParameters {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// The value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Querystring values, grouped by name in first-seen order.
///
/// ```rust
/// use trellis_core::route::QuerystringParameters;
///
/// let query = QuerystringParameters::parse("tag=a&page=2&tag=b");
/// assert_eq!(query.get("tag"), Some(&["a".to_string(), "b".to_string()][..]));
/// assert_eq!(query.first("page"), Some("2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerystringParameters {
    inner: Vec<(String, Vec<String>)>,
}

impl QuerystringParameters {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` querystring.
    ///
    /// Malformed input yields an empty set.
    pub fn parse(query: &str) -> Self {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
        let mut parameters = Self::new();
        for (name, value) in pairs {
            parameters.push(name, value);
        }
        parameters
    }

    /// Adds a value for `name`.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.inner.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some((_, values)) => values.push(value.into()),
            None => self.inner.push((name, vec![value.into()])),
        }
    }

    /// Every value of `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.inner
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// The first value of `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the querystring was empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, values)` groups.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }
}

/// How an action is reached and where its parameters come from.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use trellis_core::route::{ParameterDescriptor, ParameterType, RouteDescriptor};
///
/// let route = RouteDescriptor::new(Method::GET, "/users/{id}")
///     .unwrap()
///     .url_parameter("id", ParameterType::Integer)
///     .querystring_parameter(ParameterDescriptor::string("fields").optional())
///     .response_type("User");
///
/// assert_eq!(route.url_parameters().len(), 1);
/// assert!(route.has_response());
/// ```
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    method: Method,
    url_template: UrlTemplate,
    url_parameters: Vec<ParameterDescriptor>,
    querystring_parameters: Vec<ParameterDescriptor>,
    header_parameters: Vec<ParameterDescriptor>,
    request_parameter: Option<ParameterDescriptor>,
    response_type: Option<String>,
}

impl RouteDescriptor {
    /// Describes a route; every template parameter starts out as a string.
    pub fn new(method: Method, template: &str) -> TrellisResult<Self> {
        let url_template = UrlTemplate::parse(template)?;
        let url_parameters = url_template
            .parameter_names()
            .map(ParameterDescriptor::string)
            .collect();
        Ok(Self {
            method,
            url_template,
            url_parameters,
            querystring_parameters: Vec::new(),
            header_parameters: Vec::new(),
            request_parameter: None,
            response_type: None,
        })
    }

    /// Sets the type of the url parameter `name`.
    ///
    /// Names that do not appear in the template are ignored.
    pub fn url_parameter(mut self, name: &str, parameter_type: ParameterType) -> Self {
        if let Some(parameter) = self
            .url_parameters
            .iter_mut()
            .find(|parameter| parameter.name.eq_ignore_ascii_case(name))
        {
            parameter.parameter_type = parameter_type;
        }
        self
    }

    /// Adds a querystring parameter.
    pub fn querystring_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.querystring_parameters.push(parameter);
        self
    }

    /// Adds a header parameter; its name is the header name.
    pub fn header_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.header_parameters.push(parameter);
        self
    }

    /// Sets the parameter bound from the request body.
    pub fn request_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.request_parameter = Some(parameter);
        self
    }

    /// Declares that the action produces a response body of type `name`.
    pub fn response_type(mut self, name: impl Into<String>) -> Self {
        self.response_type = Some(name.into());
        self
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL template.
    pub fn url_template(&self) -> &UrlTemplate {
        &self.url_template
    }

    /// Parameters bound from the path.
    pub fn url_parameters(&self) -> &[ParameterDescriptor] {
        &self.url_parameters
    }

    /// Parameters bound from the querystring.
    pub fn querystring_parameters(&self) -> &[ParameterDescriptor] {
        &self.querystring_parameters
    }

    /// Parameters bound from headers.
    pub fn header_parameters(&self) -> &[ParameterDescriptor] {
        &self.header_parameters
    }

    /// The parameter bound from the body.
    pub fn request_parameter_descriptor(&self) -> Option<&ParameterDescriptor> {
        self.request_parameter.as_ref()
    }

    /// Returns `true` if a body parameter is declared.
    pub fn has_request(&self) -> bool {
        self.request_parameter.is_some()
    }

    /// The declared response type name.
    pub fn response_type_name(&self) -> Option<&str> {
        self.response_type.as_deref()
    }

    /// Returns `true` if the action declares a response body.
    pub fn has_response(&self) -> bool {
        self.response_type.is_some()
    }

    /// Returns `true` if this route serves `method` on `path`.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == method && self.url_template.match_path(path).is_some()
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url_template)
    }
}
