//! Plain text reader and writer.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use mime::Mime;
use serde_json::Value;
use trellis_core::{
    BoxFuture, Container, ParameterType, ReadResult, ReaderContext, RequestReader, Resolve,
    Response, ResponseWriter, TrellisResult, WriterContext,
};

/// Reads `text/*` bodies into a string argument.
///
/// Only applies when the body parameter is declared as a string.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringReader;

impl Resolve for StringReader {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl RequestReader for StringReader {
    fn applies(&self, context: &ReaderContext) -> bool {
        context.parameter.parameter_type == ParameterType::String
            && context
                .content_type
                .as_ref()
                .is_some_and(|media_type| media_type.type_() == mime::TEXT)
    }

    fn read<'a>(&'a self, context: &'a ReaderContext) -> BoxFuture<'a, TrellisResult<ReadResult<Value>>> {
        Box::pin(async move {
            context.cancellation.check()?;

            Ok(match std::str::from_utf8(context.request.body()) {
                Ok(text) => ReadResult::Success(Value::String(text.to_string())),
                Err(_) => ReadResult::Failure("Request body is not valid UTF-8".to_string()),
            })
        })
    }
}

/// Writes string results as `text/plain`.
///
/// Does not apply to non-string values.
#[derive(Debug, Clone)]
pub struct StringWriter {
    media_type: Mime,
}

impl Default for StringWriter {
    fn default() -> Self {
        Self {
            media_type: mime::TEXT_PLAIN_UTF_8,
        }
    }
}

impl Resolve for StringWriter {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self::default())
    }
}

impl ResponseWriter for StringWriter {
    fn media_type(&self) -> &Mime {
        &self.media_type
    }

    fn applies(&self, context: &WriterContext) -> bool {
        context.value.is_string()
    }

    fn write<'a>(
        &'a self,
        context: &'a WriterContext,
        response: &'a mut Response,
    ) -> BoxFuture<'a, TrellisResult<()>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let text = context.value.as_str().unwrap_or_default().to_string();
            *response.body_mut() = Full::new(Bytes::from(text));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            Ok(())
        })
    }
}
