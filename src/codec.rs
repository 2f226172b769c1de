//! Body codecs: the points where values become bytes and bytes become values.
//!
//! The registry picks a codec by media type. Form and multipart bodies are
//! encoded by the registry itself since their shape, not the entity, decides
//! the wire format.

use crate::constants;
use crate::error::Error;
use crate::model::operation::{PrimitiveType, ReturnType};
use crate::multimap::MultiMap;
use crate::pipeline::message::{Attachment, RequestBody};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Encodes entities to and decodes entities from one family of media types.
pub trait BodyCodec: Send + Sync {
    fn supports(&self, media_type: &str) -> bool;

    /// # Errors
    ///
    /// Returns [`Error::Codec`] when `value` cannot be represented.
    fn write(&self, value: &Value, media_type: &str) -> Result<Vec<u8>, Error>;

    /// # Errors
    ///
    /// Returns [`Error::Codec`] when `bytes` do not decode into `return_type`.
    fn read(&self, bytes: &[u8], return_type: &ReturnType, media_type: &str)
        -> Result<Value, Error>;
}

pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn supports(&self, media_type: &str) -> bool {
        constants::is_json_content_type(media_type)
    }

    fn write(&self, value: &Value, media_type: &str) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(value).map_err(|e| Error::codec(media_type, e.to_string()))
    }

    fn read(&self, bytes: &[u8], _: &ReturnType, media_type: &str) -> Result<Value, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::codec(media_type, e.to_string()))
    }
}

pub struct YamlCodec;

impl BodyCodec for YamlCodec {
    fn supports(&self, media_type: &str) -> bool {
        media_type
            .to_lowercase()
            .contains(constants::CONTENT_TYPE_IDENTIFIER_YAML)
    }

    fn write(&self, value: &Value, media_type: &str) -> Result<Vec<u8>, Error> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| Error::codec(media_type, e.to_string()))
    }

    fn read(&self, bytes: &[u8], _: &ReturnType, media_type: &str) -> Result<Value, Error> {
        serde_yaml::from_slice(bytes).map_err(|e| Error::codec(media_type, e.to_string()))
    }
}

/// `text/*` bodies; primitives are parsed from the text.
pub struct TextCodec;

impl BodyCodec for TextCodec {
    fn supports(&self, media_type: &str) -> bool {
        constants::essence(media_type).starts_with("text/")
    }

    fn write(&self, value: &Value, _: &str) -> Result<Vec<u8>, Error> {
        Ok(match value {
            Value::String(s) => s.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        })
    }

    fn read(&self, bytes: &[u8], return_type: &ReturnType, media_type: &str)
        -> Result<Value, Error> {
        let text = String::from_utf8_lossy(bytes);
        match return_type.unwrapped() {
            ReturnType::Primitive(primitive) => parse_primitive(text.trim(), *primitive)
                .ok_or_else(|| {
                    Error::codec(media_type, format!("'{text}' is not a valid {primitive:?}"))
                }),
            _ => Ok(Value::String(text.into_owned())),
        }
    }
}

fn parse_primitive(text: &str, primitive: PrimitiveType) -> Option<Value> {
    match primitive {
        PrimitiveType::Bool => text.parse::<bool>().ok().map(Value::Bool),
        PrimitiveType::I32 => text.parse::<i32>().ok().map(Value::from),
        PrimitiveType::I64 => text.parse::<i64>().ok().map(Value::from),
        PrimitiveType::F32 | PrimitiveType::F64 => text.parse::<f64>().ok().map(Value::from),
        PrimitiveType::Text => Some(Value::String(text.to_string())),
    }
}

/// `application/x-www-form-urlencoded` entities (objects of scalars or arrays).
pub struct FormCodec;

impl BodyCodec for FormCodec {
    fn supports(&self, media_type: &str) -> bool {
        constants::essence(media_type) == constants::CONTENT_TYPE_FORM
    }

    fn write(&self, value: &Value, media_type: &str) -> Result<Vec<u8>, Error> {
        let form = form_from_value(value)
            .ok_or_else(|| Error::codec(media_type, "form bodies must be objects"))?;
        Ok(encode_form(&form))
    }

    fn read(&self, bytes: &[u8], _: &ReturnType, media_type: &str) -> Result<Value, Error> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::codec(media_type, e.to_string()))?;
        let mut object = Map::new();
        for pair in text.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode_form_component(name);
            let value = Value::String(decode_form_component(value));
            match object.get_mut(&name) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    object.insert(name, value);
                }
            }
        }
        Ok(Value::Object(object))
    }
}

fn decode_form_component(component: &str) -> String {
    let plus_decoded = component.replace('+', " ");
    urlencoding::decode(&plus_decoded).map_or(plus_decoded.clone(), |s| s.into_owned())
}

/// Converts an object of scalars or arrays into form fields.
#[must_use]
pub fn form_from_value(value: &Value) -> Option<MultiMap> {
    let Value::Object(object) = value else {
        return None;
    };
    let mut form = MultiMap::new();
    for (name, value) in object {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    form.add(name.as_str(), scalar_text(item));
                }
            }
            other => form.add(name.as_str(), scalar_text(other)),
        }
    }
    Some(form)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[must_use]
pub fn encode_form(form: &MultiMap) -> Vec<u8> {
    form.pairs()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
        .into_bytes()
}

/// Ordered set of codecs; the first codec supporting a media type wins.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn BodyCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self {
            codecs: vec![
                Arc::new(JsonCodec),
                Arc::new(YamlCodec),
                Arc::new(FormCodec),
                Arc::new(TextCodec),
            ],
        }
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

impl CodecRegistry {
    /// Registers `codec` ahead of the built-in ones.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn BodyCodec>) -> Self {
        self.codecs.insert(0, codec);
        self
    }

    fn find(&self, media_type: &str) -> Option<&Arc<dyn BodyCodec>> {
        self.codecs.iter().find(|codec| codec.supports(media_type))
    }

    /// Encodes one entity. Without a content type, JSON is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] when no codec supports `media_type` or encoding fails.
    pub fn write_entity(&self, value: &Value, media_type: Option<&str>) -> Result<Vec<u8>, Error> {
        let media_type = media_type.unwrap_or(constants::CONTENT_TYPE_JSON);
        self.find(media_type)
            .ok_or_else(|| Error::codec(media_type, "no body writer registered"))?
            .write(value, media_type)
    }

    /// Encodes a request body for `content_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] when a part or the entity cannot be encoded.
    pub fn write(&self, body: &RequestBody, content_type: Option<&str>) -> Result<Vec<u8>, Error> {
        match body {
            RequestBody::Entity(value) => self.write_entity(value, content_type),
            RequestBody::Form(form) => Ok(encode_form(form)),
            RequestBody::Multipart(parts) => {
                let boundary = content_type
                    .and_then(boundary_of)
                    .ok_or_else(|| Error::codec(constants::CONTENT_TYPE_MULTIPART, "missing boundary"))?;
                self.write_multipart(parts, &boundary)
            }
        }
    }

    fn write_multipart(&self, parts: &[Attachment], boundary: &str) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        for part in parts {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            out.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.id).as_bytes(),
            );
            out.extend_from_slice(
                format!("{}: {}\r\n\r\n", constants::HEADER_CONTENT_TYPE, part.media_type).as_bytes(),
            );
            out.extend_from_slice(&self.write_entity(&part.value, Some(&part.media_type))?);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Ok(out)
    }

    /// Decodes `bytes` into the shape of `return_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] when no codec supports `media_type` or decoding fails.
    pub fn read(&self, bytes: &[u8], return_type: &ReturnType, media_type: &str)
        -> Result<Value, Error> {
        self.find(media_type)
            .ok_or_else(|| Error::codec(media_type, "no body reader registered"))?
            .read(bytes, return_type, media_type)
    }
}

/// A fresh multipart content type with a random boundary.
#[must_use]
pub fn multipart_content_type() -> String {
    format!(
        "{}; boundary=restwire-{:016x}",
        constants::CONTENT_TYPE_MULTIPART,
        fastrand::u64(..)
    )
}

fn boundary_of(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim_matches('"').to_string())
}
