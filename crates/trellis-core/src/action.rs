//! Action metadata and invocation.
//!
//! An [`ActionMethod`] is the immutable description of a handler: which
//! logical handler type and method it belongs to, marker attributes used by
//! plugin predicates, and the function that runs it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cancellation::RequestCancellation;
use crate::container::Container;
use crate::error::{TrellisError, TrellisResult};
use crate::extension::BoxFuture;

/// Everything a handler receives when it runs.
#[derive(Debug)]
pub struct ActionInvocation {
    /// The request scope; handlers resolve their services from it.
    pub scope: Container,
    /// Values bound by the request binders.
    pub arguments: ActionArguments,
    /// Cancellation signal of the request.
    pub cancellation: RequestCancellation,
}

/// The function behind an action.
///
/// Returns the response value, or `None` for actions without a body.
/// Implemented for async closures taking an [`ActionInvocation`].
pub trait ActionHandler: Send + Sync + 'static {
    /// Runs the action.
    fn invoke(&self, invocation: ActionInvocation) -> BoxFuture<'static, TrellisResult<Option<Value>>>;
}

impl<F, Fut> ActionHandler for F
where
    F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TrellisResult<Option<Value>>> + Send + 'static,
{
    fn invoke(&self, invocation: ActionInvocation) -> BoxFuture<'static, TrellisResult<Option<Value>>> {
        Box::pin(self(invocation))
    }
}

/// Immutable description of a handler method.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::action::{ActionInvocation, ActionMethod};
///
/// let action = ActionMethod::new("UserHandler", "get_user", |invocation: ActionInvocation| async move {
///     let id: u64 = invocation.arguments.get("id")?;
///     Ok(Some(json!({ "id": id })))
/// })
/// .allow_anonymous()
/// .attribute("cached");
///
/// assert_eq!(action.full_name(), "UserHandler.get_user");
/// assert!(action.has_attribute("Cached"));
/// ```
#[derive(Clone)]
pub struct ActionMethod {
    handler_type: String,
    method_name: String,
    attributes: Vec<String>,
    allow_anonymous: bool,
    handler: Arc<dyn ActionHandler>,
}

impl ActionMethod {
    /// Describes `method_name` of the logical handler `handler_type`.
    pub fn new<F, Fut>(
        handler_type: impl Into<String>,
        method_name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TrellisResult<Option<Value>>> + Send + 'static,
    {
        Self::from_handler(handler_type, method_name, Arc::new(handler))
    }

    /// Describes an action backed by a custom [`ActionHandler`].
    pub fn from_handler(
        handler_type: impl Into<String>,
        method_name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            handler_type: handler_type.into(),
            method_name: method_name.into(),
            attributes: Vec::new(),
            allow_anonymous: false,
            handler,
        }
    }

    /// Marks the action as reachable without authentication.
    pub fn allow_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }

    /// Adds a marker attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// The logical handler type.
    pub fn handler_type(&self) -> &str {
        &self.handler_type
    }

    /// The method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// `HandlerType.method_name`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.handler_type, self.method_name)
    }

    /// Returns `true` if the action may run without authentication.
    pub fn allows_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    /// The marker attributes.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns `true` if the attribute is present (case-insensitive).
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|attribute| attribute.eq_ignore_ascii_case(name))
    }

    /// The handler function.
    pub fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }
}

impl fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMethod")
            .field("handler_type", &self.handler_type)
            .field("method_name", &self.method_name)
            .field("attributes", &self.attributes)
            .field("allow_anonymous", &self.allow_anonymous)
            .finish_non_exhaustive()
    }
}

/// Values bound for the parameters of an action, in binding order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArguments {
    values: Vec<(String, Value)>,
}

impl ActionArguments {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `name`, replacing an earlier binding.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name, value)),
        }
    }

    /// The raw bound value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Returns `true` if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Deserializes the value bound to `name`.
    ///
    /// A missing or mistyped value is a bad request.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> TrellisResult<T> {
        self.get_optional(name)?
            .ok_or_else(|| TrellisError::bad_request(format!("Missing value for parameter '{name}'")))
    }

    /// Deserializes the value bound to `name`, if any.
    pub fn get_optional<T: DeserializeOwned>(&self, name: &str) -> TrellisResult<Option<T>> {
        self.value(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    TrellisError::bad_request(format!("Invalid value for parameter '{name}': {e}"))
                })
            })
            .transpose()
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    #[test]
    fn test_arguments_typed_access() {
        let mut arguments = ActionArguments::new();
        arguments.insert("id", json!(42));
        arguments.insert("user", json!({ "name": "ada" }));

        assert_eq!(arguments.get::<u64>("id").unwrap(), 42);
        assert_eq!(
            arguments.get::<User>("user").unwrap(),
            User {
                name: "ada".to_string()
            }
        );
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn test_arguments_missing_is_bad_request() {
        let arguments = ActionArguments::new();
        let err = arguments.get::<u64>("id").unwrap_err();
        assert!(err.is_bad_request());
        assert_eq!(arguments.get_optional::<u64>("id").unwrap(), None);
    }

    #[test]
    fn test_arguments_mistyped_is_bad_request() {
        let mut arguments = ActionArguments::new();
        arguments.insert("id", json!("abc"));
        let err = arguments.get::<u64>("id").unwrap_err();
        assert!(err.is_bad_request());
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_arguments_insert_replaces() {
        let mut arguments = ActionArguments::new();
        arguments.insert("id", json!(1));
        arguments.insert("id", json!(2));
        assert_eq!(arguments.len(), 1);
        assert_eq!(arguments.value("id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let action = ActionMethod::new("Echo", "echo", |invocation: ActionInvocation| async move {
            Ok(invocation.arguments.value("message").cloned())
        });

        let mut arguments = ActionArguments::new();
        arguments.insert("message", json!("hi"));
        let result = action
            .handler()
            .invoke(ActionInvocation {
                scope: Container::new(),
                arguments,
                cancellation: RequestCancellation::none(),
            })
            .await
            .unwrap();

        assert_eq!(result, Some(json!("hi")));
        assert!(!action.allows_anonymous());
    }
}
