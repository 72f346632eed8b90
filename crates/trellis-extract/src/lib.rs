//! # Trellis Extract
//!
//! Default request readers, binders and response plugins for Trellis.
//!
//! ## Readers
//!
//! | Reader | Content type | Produces |
//! |--------|--------------|----------|
//! | [`JsonReader`] | `application/json`, `*/*+json` | the parsed document |
//! | [`FormReader`] | `application/x-www-form-urlencoded` | an object of string fields |
//! | [`StringReader`] | `text/*` | a string (string parameters only) |
//!
//! ## Binders
//!
//! | Binder | Source |
//! |--------|--------|
//! | [`UrlParameterBinder`] | values matched from the URL template |
//! | [`QuerystringBinder`] | querystring parameters |
//! | [`HeaderBinder`] | request headers |
//! | [`ReaderBinder`] | the request body, through the first applicable reader |
//!
//! Raw strings are converted to the declared [`ParameterType`](trellis_core::ParameterType);
//! a value that does not convert is a bad request carrying the conversion
//! message.
//!
//! ## Writers
//!
//! | Writer | Media type |
//! |--------|------------|
//! | [`JsonWriter`] | `application/json` |
//! | [`StringWriter`] | `text/plain` (string values only) |
//!
//! ## Example
//!
//! ```rust
//! use trellis_core::Configuration;
//! use trellis_extract::{JsonReader, JsonWriter, QuerystringBinder, ReaderBinder};
//!
//! let mut configuration = Configuration::new();
//! configuration.request_readers.append::<JsonReader>();
//! configuration.request_binders.append::<QuerystringBinder>().append::<ReaderBinder>();
//! configuration.response_writers.append::<JsonWriter>();
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod body;
pub mod convert;
mod form;
mod header;
mod json;
mod path;
mod query;
mod response;
mod text;

#[cfg(test)]
mod testing;

pub use body::ReaderBinder;
pub use form::FormReader;
pub use header::HeaderBinder;
pub use json::{JsonReader, JsonWriter};
pub use path::UrlParameterBinder;
pub use query::QuerystringBinder;
pub use response::{DefaultResponseHeaders, DefaultResponseStatus};
pub use text::{StringReader, StringWriter};
