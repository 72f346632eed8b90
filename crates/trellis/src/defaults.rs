//! The configuration a new runtime starts from.

use trellis_behaviors::{AuthenticationBehavior, DefaultBehavior, ErrorHandlingBehavior};
use trellis_core::{Configuration, Plugin};
use trellis_extract::{
    DefaultResponseHeaders, DefaultResponseStatus, FormReader, HeaderBinder, JsonReader,
    JsonWriter, QuerystringBinder, ReaderBinder, StringReader, StringWriter, UrlParameterBinder,
};

/// Builds the stock pipeline configuration.
///
/// | Extension point | Plugins, in order |
/// |-----------------|-------------------|
/// | behaviors | `ErrorHandlingBehavior`, `AuthenticationBehavior` (not for anonymous actions) |
/// | default behavior | `DefaultBehavior` |
/// | binders | url parameters, querystring, headers, request body |
/// | readers | JSON, form, plain text |
/// | writers | JSON, plain text |
/// | status | `DefaultResponseStatus` |
/// | headers | `DefaultResponseHeaders` |
///
/// No authenticators are configured; add them together with their
/// credential validators.
pub fn default_configuration() -> Configuration {
    let mut configuration = Configuration::new();

    configuration
        .behaviors
        .append::<ErrorHandlingBehavior>()
        .append_when::<AuthenticationBehavior>(|context| !context.action().allows_anonymous());
    configuration.default_behavior = Some(Plugin::of::<DefaultBehavior>());

    configuration
        .request_binders
        .append::<UrlParameterBinder>()
        .append::<QuerystringBinder>()
        .append::<HeaderBinder>()
        .append::<ReaderBinder>();
    configuration
        .request_readers
        .append::<JsonReader>()
        .append::<FormReader>()
        .append::<StringReader>();
    configuration
        .response_writers
        .append::<JsonWriter>()
        .append::<StringWriter>();
    configuration.response_status.append::<DefaultResponseStatus>();
    configuration.response_headers.append::<DefaultResponseHeaders>();

    configuration
}
