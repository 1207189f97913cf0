//! Duplicate-aware decoding of JSON text into a `serde_json::Value`.
//!
//! `serde_json::Value` keeps only the last of two equal keys. Decoding through
//! this visitor builds the same value but records every repeated key as a
//! `DuplicateName` diagnostic first.

use crate::error::{Diagnostic, DocPath, ErrorKind};
use serde::de::{DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::fmt;

/// A decoded document plus the duplicate keys seen while decoding it.
#[derive(Debug)]
pub struct RawDocument {
    pub value: Value,
    pub duplicates: Vec<Diagnostic>,
}

pub fn decode_str(text: &str) -> Result<RawDocument, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(text);
    let doc = decode(&mut de)?;
    de.end()?;
    Ok(doc)
}

pub fn decode_slice(bytes: &[u8]) -> Result<RawDocument, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let doc = decode(&mut de)?;
    de.end()?;
    Ok(doc)
}

fn decode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RawDocument, D::Error> {
    let duplicates = RefCell::new(Vec::new());
    let value = ValueSeed {
        path: DocPath::root(),
        duplicates: &duplicates,
    }
    .deserialize(deserializer)?;
    Ok(RawDocument {
        value,
        duplicates: duplicates.into_inner(),
    })
}

struct ValueSeed<'a> {
    path: DocPath,
    duplicates: &'a RefCell<Vec<Diagnostic>>,
}

impl<'a> ValueSeed<'a> {
    fn child(&self, key: impl Into<String>) -> ValueSeed<'a> {
        ValueSeed {
            path: self.path.child(key),
            duplicates: self.duplicates,
        }
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(self.child(items.len().to_string()))? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut object = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.child(key.as_str()))?;
            if object.contains_key(&key) {
                let path = self.path.child(key.as_str());
                self.duplicates.borrow_mut().push(
                    Diagnostic::new(
                        ErrorKind::DuplicateName,
                        &path,
                        format!("key `{}` appears more than once", key),
                    )
                    .with_subject(key.as_str()),
                );
            }
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}
