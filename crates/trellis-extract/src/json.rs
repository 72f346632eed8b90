//! JSON request reader and response writer.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use mime::Mime;
use serde_json::Value;
use trellis_core::{
    BoxFuture, Container, ReadResult, ReaderContext, RequestReader, Resolve, Response,
    ResponseWriter, TrellisError, TrellisResult, WriterContext,
};

/// Returns `true` for `application/json` and `application/*+json`.
pub(crate) fn is_json(media_type: &Mime) -> bool {
    media_type.type_() == mime::APPLICATION
        && (media_type.subtype() == mime::JSON || media_type.suffix() == Some(mime::JSON))
}

/// Reads JSON request bodies.
///
/// Applies to `application/json` and structured `+json` media types. An
/// empty or malformed body is a read failure, reported as a bad request.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReader;

impl Resolve for JsonReader {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl RequestReader for JsonReader {
    fn applies(&self, context: &ReaderContext) -> bool {
        context.content_type.as_ref().is_some_and(is_json)
    }

    fn read<'a>(&'a self, context: &'a ReaderContext) -> BoxFuture<'a, TrellisResult<ReadResult<Value>>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let body = context.request.body();
            if body.is_empty() {
                return Ok(ReadResult::Failure("Request body is empty".to_string()));
            }

            Ok(match serde_json::from_slice(body) {
                Ok(value) => ReadResult::Success(value),
                Err(e) => ReadResult::Failure(format!("Request body is not valid JSON: {e}")),
            })
        })
    }
}

/// Writes handler results as `application/json`.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    media_type: Mime,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self {
            media_type: mime::APPLICATION_JSON,
        }
    }
}

impl Resolve for JsonWriter {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self::default())
    }
}

impl ResponseWriter for JsonWriter {
    fn media_type(&self) -> &Mime {
        &self.media_type
    }

    fn write<'a>(
        &'a self,
        context: &'a WriterContext,
        response: &'a mut Response,
    ) -> BoxFuture<'a, TrellisResult<()>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let body = serde_json::to_vec(&context.value).map_err(|e| {
                TrellisError::internal_with_source("failed to serialize response body", e)
            })?;
            *response.body_mut() = Full::new(Bytes::from(body));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(())
        })
    }
}
