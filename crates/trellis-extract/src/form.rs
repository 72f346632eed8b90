//! URL-encoded form reader.

use serde_json::map::Entry;
use serde_json::{Map, Value};
use trellis_core::{
    BoxFuture, Container, ReadResult, ReaderContext, RequestReader, Resolve, TrellisResult,
};

/// Reads `application/x-www-form-urlencoded` bodies into a JSON object.
///
/// Each field becomes a string property; a field that appears more than
/// once becomes an array of strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormReader;

impl Resolve for FormReader {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl RequestReader for FormReader {
    fn applies(&self, context: &ReaderContext) -> bool {
        context
            .content_type
            .as_ref()
            .is_some_and(|media_type| {
                media_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()
            })
    }

    fn read<'a>(&'a self, context: &'a ReaderContext) -> BoxFuture<'a, TrellisResult<ReadResult<Value>>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let pairs: Vec<(String, String)> = match serde_urlencoded::from_bytes(context.request.body()) {
                Ok(pairs) => pairs,
                Err(e) => return Ok(ReadResult::Failure(format!("Invalid form body: {e}"))),
            };

            let mut fields = Map::new();
            for (name, value) in pairs {
                match fields.entry(name) {
                    Entry::Vacant(entry) => {
                        entry.insert(Value::String(value));
                    }
                    Entry::Occupied(mut entry) => match entry.get_mut() {
                        Value::Array(values) => values.push(Value::String(value)),
                        existing => {
                            let first = existing.take();
                            *existing = Value::Array(vec![first, Value::String(value)]);
                        }
                    },
                }
            }
            Ok(ReadResult::Success(Value::Object(fields)))
        })
    }
}
