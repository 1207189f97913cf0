//! Syntactic validation: raw JSON value → typed [`IsfDocument`].
//!
//! Every object in the document has a closed key set. The validator walks the
//! whole value, collects every structural problem it finds with its path, and
//! only yields a document if there were none. No name is resolved here.

use crate::config::Options;
use crate::error::{Diagnostic, Diagnostics, DocPath, ErrorKind};
use crate::types::{
    BaseRef, BaseType, EnumType, FieldDef, IsfDocument, Metadata, Producer, Source, Symbol,
    TypeDescriptor, UserKind, UserType,
};
use regex::Regex;
use semver::{Version, VersionReq};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

const TOP_LEVEL_KEYS: &[&str] = &["metadata", "base_types", "user_types", "enums", "symbols"];

static FORMAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0\.[1-9]+\.[0-9]+$").expect("format pattern is a valid regex"));

/// Check a `metadata.format` string against the accepted pattern and range.
pub fn check_format(format: &str, supported: &VersionReq) -> Result<Version, String> {
    if !FORMAT_PATTERN.is_match(format) {
        return Err(format!(
            "format `{}` does not match `0.<minor>.<patch>`",
            format
        ));
    }
    let version =
        Version::parse(format).map_err(|e| format!("format `{}`: {}", format, e))?;
    if !supported.matches(&version) {
        return Err(format!(
            "format {} is outside the supported range {}",
            version, supported
        ));
    }
    Ok(version)
}

/// Validate a raw document and build the typed container model.
pub fn validate_document(raw: &Value, options: &Options) -> Result<IsfDocument, Diagnostics> {
    let mut v = Validator {
        options,
        diags: Diagnostics::new(),
    };
    let doc = v.document(raw);
    match doc {
        Some(doc) if v.diags.is_empty() => {
            debug!(
                base_types = doc.base_types.len(),
                user_types = doc.user_types.len(),
                enums = doc.enums.len(),
                symbols = doc.symbols.len(),
                "document passed syntactic validation"
            );
            Ok(doc)
        }
        _ => Err(v.diags),
    }
}

struct Validator<'o> {
    options: &'o Options,
    diags: Diagnostics,
}

impl Validator<'_> {
    fn report(&mut self, kind: ErrorKind, path: &DocPath, message: impl Into<String>) {
        self.diags.push(Diagnostic::new(kind, path, message));
    }

    fn object<'v>(
        &mut self,
        value: &'v Value,
        path: &DocPath,
        what: &str,
        kind: ErrorKind,
    ) -> Option<&'v Map<String, Value>> {
        match value.as_object() {
            Some(map) => Some(map),
            None => {
                self.report(kind, path, format!("{} must be an object, found {}", what, type_name(value)));
                None
            }
        }
    }

    /// Report missing required keys and any key outside `required ∪ optional`.
    /// Returns true when every required key is present.
    fn closed_keys(
        &mut self,
        map: &Map<String, Value>,
        path: &DocPath,
        required: &[&str],
        optional: &[&str],
        kind: ErrorKind,
    ) -> bool {
        let mut complete = true;
        for key in required {
            if !map.contains_key(*key) {
                self.report(kind, path, format!("missing required key `{}`", key));
                complete = false;
            }
        }
        for key in map.keys() {
            if !required.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
                self.report(kind, &path.child(key.as_str()), format!("unexpected key `{}`", key));
            }
        }
        complete
    }

    fn uint(&mut self, value: &Value, path: &DocPath, kind: ErrorKind) -> Option<u64> {
        match value.as_u64() {
            Some(n) => Some(n),
            None => {
                self.report(
                    kind,
                    path,
                    format!("expected a non-negative integer, found {}", describe_value(value)),
                );
                None
            }
        }
    }

    fn string<'v>(&mut self, value: &'v Value, path: &DocPath, kind: ErrorKind) -> Option<&'v str> {
        match value.as_str() {
            Some(s) => Some(s),
            None => {
                self.report(kind, path, format!("expected a string, found {}", type_name(value)));
                None
            }
        }
    }

    fn opt_string(&mut self, map: &Map<String, Value>, key: &str, path: &DocPath) -> Option<String> {
        let value = map.get(key)?;
        self.string(value, &path.child(key), ErrorKind::MalformedDocument)
            .map(str::to_owned)
    }

    fn document(&mut self, raw: &Value) -> Option<IsfDocument> {
        let root = DocPath::root();
        let map = self.object(raw, &root, "document", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, &root, TOP_LEVEL_KEYS, &[], ErrorKind::MalformedDocument);

        let metadata = map.get("metadata").and_then(|m| self.metadata(m, &root.child("metadata")));
        let base_types = map.get("base_types").and_then(|m| {
            self.collection(m, &root.child("base_types"), "base_types", Self::base_type)
        });
        let user_types = map.get("user_types").and_then(|m| {
            self.collection(m, &root.child("user_types"), "user_types", Self::user_type)
        });
        let enums = map
            .get("enums")
            .and_then(|m| self.collection(m, &root.child("enums"), "enums", Self::enum_type));
        let symbols = map
            .get("symbols")
            .and_then(|m| self.collection(m, &root.child("symbols"), "symbols", Self::symbol));

        Some(IsfDocument {
            metadata: metadata?,
            base_types: base_types?,
            user_types: user_types?,
            enums: enums?,
            symbols: symbols?,
        })
    }

    /// Validate every entry of a name → definition map. Yields the map only if
    /// every entry validated.
    fn collection<T>(
        &mut self,
        value: &Value,
        path: &DocPath,
        what: &str,
        entry: fn(&mut Self, &Value, &DocPath) -> Option<T>,
    ) -> Option<BTreeMap<String, T>> {
        let map = self.object(value, path, what, ErrorKind::MalformedDocument)?;
        let mut out = BTreeMap::new();
        let mut complete = true;
        for (name, v) in map {
            match entry(self, v, &path.child(name.as_str())) {
                Some(def) => {
                    out.insert(name.clone(), def);
                }
                None => complete = false,
            }
        }
        complete.then_some(out)
    }

    fn metadata(&mut self, value: &Value, path: &DocPath) -> Option<Metadata> {
        let map = self.object(value, path, "metadata", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, path, &["format"], &["source", "producer"], ErrorKind::MalformedDocument);

        let format_path = path.child("format");
        let format = match map.get("format") {
            Some(v) => self.string(v, &format_path, ErrorKind::MalformedDocument),
            None => None,
        };
        if let Some(format) = format {
            if let Err(msg) = check_format(format, &self.options.supported_formats) {
                self.report(ErrorKind::VersionUnsupported, &format_path, msg);
            }
        }

        let source = match map.get("source") {
            Some(v) => {
                let source_path = path.child("source");
                let m = self.object(v, &source_path, "metadata.source", ErrorKind::MalformedDocument)?;
                self.closed_keys(m, &source_path, &[], &["type"], ErrorKind::MalformedDocument);
                Some(Source {
                    kind: self.opt_string(m, "type", &source_path),
                })
            }
            None => None,
        };

        let producer = match map.get("producer") {
            Some(v) => {
                let producer_path = path.child("producer");
                let m = self.object(v, &producer_path, "metadata.producer", ErrorKind::MalformedDocument)?;
                self.closed_keys(
                    m,
                    &producer_path,
                    &[],
                    &["name", "version", "timestamp", "datetime"],
                    ErrorKind::MalformedDocument,
                );
                Some(Producer {
                    name: self.opt_string(m, "name", &producer_path),
                    version: self.opt_string(m, "version", &producer_path),
                    timestamp: self.opt_string(m, "timestamp", &producer_path),
                    datetime: self.opt_string(m, "datetime", &producer_path),
                })
            }
            None => None,
        };

        Some(Metadata {
            format: format?.to_owned(),
            source,
            producer,
        })
    }

    fn base_type(&mut self, value: &Value, path: &DocPath) -> Option<BaseType> {
        let map = self.object(value, path, "base type", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, path, &["length"], &[], ErrorKind::MalformedDocument);
        let length = self.uint(map.get("length")?, &path.child("length"), ErrorKind::MalformedDocument)?;
        Some(BaseType { length })
    }

    fn user_type(&mut self, value: &Value, path: &DocPath) -> Option<UserType> {
        let map = self.object(value, path, "user type", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, path, &["kind", "length", "fields"], &[], ErrorKind::MalformedDocument);

        let kind_path = path.child("kind");
        let kind = map
            .get("kind")
            .and_then(|v| self.string(v, &kind_path, ErrorKind::MalformedDocument))
            .and_then(|s| {
                let kind = UserKind::parse(s);
                if kind.is_none() {
                    self.report(
                        ErrorKind::MalformedDocument,
                        &kind_path,
                        format!("user type kind must be struct, union or class, found `{}`", s),
                    );
                }
                kind
            });
        let length = map
            .get("length")
            .and_then(|v| self.uint(v, &path.child("length"), ErrorKind::MalformedDocument));
        let fields = map
            .get("fields")
            .and_then(|v| self.collection(v, &path.child("fields"), "fields", Self::field));

        Some(UserType {
            kind: kind?,
            length: length?,
            fields: fields?,
        })
    }

    fn field(&mut self, value: &Value, path: &DocPath) -> Option<FieldDef> {
        let map = self.object(value, path, "field", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, path, &["type", "offset"], &[], ErrorKind::MalformedDocument);
        let type_info = map.get("type").and_then(|v| self.descriptor(v, &path.child("type")));
        let offset = map
            .get("offset")
            .and_then(|v| self.uint(v, &path.child("offset"), ErrorKind::MalformedDocument));
        Some(FieldDef {
            type_info: type_info?,
            offset: offset?,
        })
    }

    fn descriptor(&mut self, value: &Value, path: &DocPath) -> Option<TypeDescriptor> {
        const BAD: ErrorKind = ErrorKind::UnknownDescriptorVariant;

        let map = self.object(value, path, "type descriptor", BAD)?;
        let kind_path = path.child("kind");
        let Some(kind_value) = map.get("kind") else {
            self.report(BAD, path, "type descriptor has no `kind`");
            return None;
        };
        let kind = self.string(kind_value, &kind_path, BAD)?;

        let (required, optional): (&[&str], &[&str]) = match kind {
            "pointer" => (&["kind", "subtype"], &[]),
            "base" | "struct" | "class" | "union" | "enum" => (&["kind", "name"], &[]),
            "array" => (&["kind", "subtype", "count"], &[]),
            "function" => (&["kind"], &[]),
            "bitfield" => (&["kind", "bit_position", "bit_length", "type"], &[]),
            other => {
                self.report(BAD, &kind_path, format!("unknown descriptor kind `{}`", other));
                return None;
            }
        };
        if !self.closed_keys(map, path, required, optional, BAD) {
            return None;
        }

        let name = |this: &mut Self| -> Option<String> {
            map.get("name")
                .and_then(|v| this.string(v, &path.child("name"), BAD))
                .map(str::to_owned)
        };

        match kind {
            "pointer" => {
                let subtype = self.descriptor(&map["subtype"], &path.child("subtype"))?;
                Some(TypeDescriptor::pointer_to(subtype))
            }
            "base" => Some(TypeDescriptor::Base { name: name(self)? }),
            "struct" => Some(TypeDescriptor::Struct { name: name(self)? }),
            "class" => Some(TypeDescriptor::Class { name: name(self)? }),
            "union" => Some(TypeDescriptor::Union { name: name(self)? }),
            "enum" => Some(TypeDescriptor::Enum { name: name(self)? }),
            "array" => {
                let count = self.uint(&map["count"], &path.child("count"), BAD);
                let subtype = self.descriptor(&map["subtype"], &path.child("subtype"));
                Some(TypeDescriptor::array_of(count?, subtype?))
            }
            "function" => Some(TypeDescriptor::Function),
            "bitfield" => {
                let bit_position = self.uint(&map["bit_position"], &path.child("bit_position"), BAD);
                let bit_length = self.uint(&map["bit_length"], &path.child("bit_length"), BAD);
                let storage_path = path.child("type");
                let storage = match self.descriptor(&map["type"], &storage_path)? {
                    TypeDescriptor::Base { name } => Some(BaseRef::new(name)),
                    other => {
                        self.report(
                            BAD,
                            &storage_path,
                            format!("bitfield storage must be a base descriptor, found {}", other.kind_str()),
                        );
                        None
                    }
                };
                Some(TypeDescriptor::Bitfield {
                    bit_position: bit_position?,
                    bit_length: bit_length?,
                    storage: storage?,
                })
            }
            _ => None,
        }
    }

    fn enum_type(&mut self, value: &Value, path: &DocPath) -> Option<EnumType> {
        let map = self.object(value, path, "enum", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, path, &["length", "base", "constants"], &[], ErrorKind::MalformedDocument);

        let length = map
            .get("length")
            .and_then(|v| self.uint(v, &path.child("length"), ErrorKind::MalformedDocument));
        let base = map
            .get("base")
            .and_then(|v| self.string(v, &path.child("base"), ErrorKind::MalformedDocument))
            .map(str::to_owned);
        let constants = map.get("constants").and_then(|v| {
            let constants_path = path.child("constants");
            let m = self.object(v, &constants_path, "enum constants", ErrorKind::MalformedDocument)?;
            let mut out = BTreeMap::new();
            let mut complete = true;
            for (name, value) in m {
                match value.as_i64().map(i128::from).or_else(|| value.as_u64().map(i128::from)) {
                    Some(n) => {
                        out.insert(name.clone(), n);
                    }
                    None => {
                        self.report(
                            ErrorKind::MalformedDocument,
                            &constants_path.child(name.as_str()),
                            format!("enum constant must be an integer, found {}", describe_value(value)),
                        );
                        complete = false;
                    }
                }
            }
            complete.then_some(out)
        });

        Some(EnumType {
            length: length?,
            base: base?,
            constants: constants?,
        })
    }

    fn symbol(&mut self, value: &Value, path: &DocPath) -> Option<Symbol> {
        let map = self.object(value, path, "symbol", ErrorKind::MalformedDocument)?;
        self.closed_keys(map, path, &["address"], &["linkage_name"], ErrorKind::MalformedDocument);

        let address_path = path.child("address");
        let address = map.get("address").and_then(|v| self.address(v, &address_path));
        let linkage_name = self.opt_string(map, "linkage_name", path);
        if map.contains_key("linkage_name") && linkage_name.is_none() {
            return None;
        }
        Some(Symbol {
            address: address?,
            linkage_name,
        })
    }

    /// Symbol addresses may be any JSON number; only non-negative values that
    /// fit a `u64` are usable. Fractional parts are dropped.
    fn address(&mut self, value: &Value, path: &DocPath) -> Option<u64> {
        if let Some(n) = value.as_u64() {
            return Some(n);
        }
        // 2^64: the first f64 that no longer fits a u64.
        const LIMIT: f64 = 18_446_744_073_709_551_616.0;
        match value.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f < LIMIT => {
                if f.fract() != 0.0 {
                    warn!(path = %path, address = f, "truncating fractional symbol address");
                }
                Some(f.trunc() as u64)
            }
            _ => {
                self.report(
                    ErrorKind::MalformedDocument,
                    path,
                    format!("symbol address must be a non-negative number, found {}", describe_value(value)),
                );
                None
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => type_name(other).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_doc() -> Value {
        json!({
            "metadata": {
                "format": "0.1.0",
                "source": { "type": "dwarf" },
                "producer": { "name": "dwarf2json", "version": "0.6.0", "datetime": "2020-01-01T00:00:00" }
            },
            "base_types": {
                "int": { "length": 4 },
                "unsigned char": { "length": 1 },
                "pointer": { "length": 8 }
            },
            "user_types": {
                "list_head": {
                    "kind": "struct",
                    "length": 16,
                    "fields": {
                        "next": { "type": { "kind": "pointer", "subtype": { "kind": "struct", "name": "list_head" } }, "offset": 0 },
                        "prev": { "type": { "kind": "pointer", "subtype": { "kind": "struct", "name": "list_head" } }, "offset": 8 }
                    }
                },
                "task": {
                    "kind": "struct",
                    "length": 48,
                    "fields": {
                        "state": { "type": { "kind": "enum", "name": "task_state" }, "offset": 0 },
                        "flags": { "type": { "kind": "bitfield", "bit_position": 0, "bit_length": 3, "type": { "kind": "base", "name": "int" } }, "offset": 4 },
                        "comm": { "type": { "kind": "array", "count": 16, "subtype": { "kind": "base", "name": "unsigned char" } }, "offset": 8 },
                        "tasks": { "type": { "kind": "struct", "name": "list_head" }, "offset": 24 },
                        "entry": { "type": { "kind": "pointer", "subtype": { "kind": "function" } }, "offset": 40 }
                    }
                }
            },
            "enums": {
                "task_state": { "length": 4, "base": "int", "constants": { "RUNNING": 0, "SLEEPING": 1 } }
            },
            "symbols": {
                "init_task": { "address": 4096 },
                "_ZN4core3fmt5write": { "address": 8192, "linkage_name": "core::fmt::write" }
            }
        })
    }

    fn errors(doc: &Value) -> Diagnostics {
        validate_document(doc, &Options::default()).unwrap_err()
    }

    #[test]
    fn test_valid_document() {
        let doc = validate_document(&valid_doc(), &Options::default()).unwrap();
        assert_eq!(doc.metadata.format, "0.1.0");
        assert_eq!(doc.metadata.source.as_ref().and_then(|s| s.kind.as_deref()), Some("dwarf"));
        assert_eq!(doc.base_types["int"].length, 4);

        let task = &doc.user_types["task"];
        assert_eq!(task.kind, UserKind::Struct);
        assert_eq!(task.fields["comm"].offset, 8);
        assert_eq!(
            task.fields["flags"].type_info,
            TypeDescriptor::Bitfield {
                bit_position: 0,
                bit_length: 3,
                storage: BaseRef::new("int")
            }
        );
        assert_eq!(doc.enums["task_state"].constants["SLEEPING"], 1);
        assert_eq!(
            doc.symbols["_ZN4core3fmt5write"].linkage_name.as_deref(),
            Some("core::fmt::write")
        );
    }

    #[test]
    fn test_extra_top_level_key() {
        let mut doc = valid_doc();
        doc["extra"] = json!({});
        let errs = errors(&doc);
        assert_eq!(errs.len(), 1);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.kind, ErrorKind::MalformedDocument);
        assert_eq!(d.path.to_string(), "extra");
    }

    #[test]
    fn test_missing_collections() {
        let errs = errors(&json!({ "metadata": { "format": "0.1.0" } }));
        assert_eq!(errs.of_kind(ErrorKind::MalformedDocument).count(), 4);
    }

    #[test]
    fn test_format_pattern() {
        let supported = Options::default().supported_formats;
        assert!(check_format("0.1.0", &supported).is_ok());
        assert!(check_format("0.4.12", &supported).is_ok());
        assert!(check_format("6.2.0", &supported).is_err());
        assert!(check_format("0.0.1", &supported).is_err());
        assert!(check_format("0.10.0", &supported).is_err());
        assert!(check_format("0.1", &supported).is_err());
        assert!(check_format("0.1.0-rc1", &supported).is_err());

        let narrow = VersionReq::parse("^0.1").unwrap();
        assert!(check_format("0.2.0", &narrow).is_err());
    }

    #[test]
    fn test_version_unsupported() {
        let mut doc = valid_doc();
        doc["metadata"]["format"] = json!("6.2.0");
        let errs = errors(&doc);
        assert!(errs.contains(ErrorKind::VersionUnsupported));
        let d = errs.of_kind(ErrorKind::VersionUnsupported).next().unwrap();
        assert_eq!(d.path.to_string(), "metadata.format");
    }

    #[test]
    fn test_closed_base_and_field_shapes() {
        let mut doc = valid_doc();
        doc["base_types"]["int"] = json!({ "length": 4, "signed": true });
        doc["user_types"]["list_head"]["fields"]["next"]["bit"] = json!(1);
        doc["user_types"]["task"]["length"] = json!(-1);
        let errs = errors(&doc);
        let paths: Vec<String> = errs.iter().map(|d| d.path.to_string()).collect();
        assert!(paths.contains(&"base_types.int.signed".to_string()));
        assert!(paths.contains(&"user_types.list_head.fields.next.bit".to_string()));
        assert!(paths.contains(&"user_types.task.length".to_string()));
        assert!(errs.iter().all(|d| d.kind == ErrorKind::MalformedDocument));
    }

    #[test]
    fn test_bad_user_kind() {
        let mut doc = valid_doc();
        doc["user_types"]["task"]["kind"] = json!("interface");
        let errs = errors(&doc);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.path.to_string(), "user_types.task.kind");
    }

    #[test]
    fn test_unknown_descriptor_kind() {
        let mut doc = valid_doc();
        doc["user_types"]["task"]["fields"]["state"]["type"] = json!({ "kind": "vtable", "name": "x" });
        let errs = errors(&doc);
        assert_eq!(errs.len(), 1);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.kind, ErrorKind::UnknownDescriptorVariant);
        assert_eq!(d.path.to_string(), "user_types.task.fields.state.type.kind");
    }

    #[test]
    fn test_descriptor_payload_is_closed() {
        let mut doc = valid_doc();
        // A pointer carrying an array's `count`.
        doc["user_types"]["list_head"]["fields"]["prev"]["type"]["count"] = json!(2);
        // An array missing its count.
        doc["user_types"]["task"]["fields"]["comm"]["type"]
            .as_object_mut()
            .unwrap()
            .remove("count");
        let errs = errors(&doc);
        assert_eq!(errs.of_kind(ErrorKind::UnknownDescriptorVariant).count(), 2);
    }

    #[test]
    fn test_nested_descriptor_path() {
        let mut doc = valid_doc();
        doc["user_types"]["list_head"]["fields"]["next"]["type"]["subtype"] = json!({ "kind": "struct" });
        let errs = errors(&doc);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.kind, ErrorKind::UnknownDescriptorVariant);
        assert_eq!(d.path.to_string(), "user_types.list_head.fields.next.type.subtype");
    }

    #[test]
    fn test_bitfield_storage_must_be_base() {
        let mut doc = valid_doc();
        doc["user_types"]["task"]["fields"]["flags"]["type"]["type"] =
            json!({ "kind": "pointer", "subtype": { "kind": "base", "name": "int" } });
        let errs = errors(&doc);
        assert_eq!(errs.len(), 1);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.kind, ErrorKind::UnknownDescriptorVariant);
        assert!(d.message.contains("pointer"));
        assert_eq!(d.path.to_string(), "user_types.task.fields.flags.type.type");
    }

    #[test]
    fn test_enum_shape() {
        let mut doc = valid_doc();
        doc["enums"]["task_state"]["constants"]["ZOMBIE"] = json!("4");
        doc["enums"]["task_state"].as_object_mut().unwrap().remove("base");
        let errs = errors(&doc);
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().any(|d| d.path.to_string() == "enums.task_state.constants.ZOMBIE"));
        assert!(errs.iter().any(|d| d.message.contains("`base`")));
    }

    #[test]
    fn test_enum_constants_span_signed_and_unsigned() {
        let mut doc = valid_doc();
        doc["enums"]["task_state"]["constants"]["ALL"] = json!(u64::MAX);
        doc["enums"]["task_state"]["constants"]["MIN"] = json!(i64::MIN);
        let parsed = validate_document(&doc, &Options::default()).unwrap();
        let constants = &parsed.enums["task_state"].constants;
        assert_eq!(constants["ALL"], 18446744073709551615);
        assert_eq!(constants["MIN"], -9223372036854775808);

        doc["enums"]["task_state"]["constants"]["HALF"] = json!(0.5);
        let errs = errors(&doc);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs.iter().next().unwrap().path.to_string(), "enums.task_state.constants.HALF");
    }

    #[test]
    fn test_producer_timestamp() {
        let mut doc = valid_doc();
        doc["metadata"]["producer"] = json!({ "name": "p", "version": "1", "timestamp": "2020-01-01" });
        let parsed = validate_document(&doc, &Options::default()).unwrap();
        let producer = parsed.metadata.producer.unwrap();
        assert_eq!(producer.timestamp.as_deref(), Some("2020-01-01"));
        assert_eq!(producer.datetime, None);

        let parsed = validate_document(&valid_doc(), &Options::default()).unwrap();
        let producer = parsed.metadata.producer.unwrap();
        assert_eq!(producer.datetime.as_deref(), Some("2020-01-01T00:00:00"));

        doc["metadata"]["producer"]["date"] = json!("2020");
        let errs = errors(&doc);
        assert_eq!(errs.iter().next().unwrap().path.to_string(), "metadata.producer.date");
    }

    #[test]
    fn test_symbol_addresses() {
        let mut doc = valid_doc();
        doc["symbols"]["frac"] = json!({ "address": 4100.75 });
        doc["symbols"]["whole"] = json!({ "address": 12288.0 });
        let parsed = validate_document(&doc, &Options::default()).unwrap();
        assert_eq!(parsed.symbols["frac"].address, 4100);
        assert_eq!(parsed.symbols["whole"].address, 12288);

        doc["symbols"]["neg"] = json!({ "address": -1 });
        doc["symbols"]["text"] = json!({ "address": "0x1000" });
        doc["symbols"]["extra"] = json!({ "address": 1, "type": {} });
        let errs = errors(&doc);
        assert_eq!(errs.len(), 3);
        assert!(errs.iter().any(|d| d.path.to_string() == "symbols.neg.address"));
        assert!(errs.iter().any(|d| d.path.to_string() == "symbols.text.address"));
        assert!(errs.iter().any(|d| d.path.to_string() == "symbols.extra.type"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut doc = valid_doc();
        doc["metadata"]["format"] = json!("1.0.0");
        doc["base_types"]["int"] = json!({});
        doc["symbols"]["init_task"] = json!({});
        let errs = errors(&doc);
        assert_eq!(errs.len(), 3);
        assert!(errs.contains(ErrorKind::VersionUnsupported));
    }

    #[test]
    fn test_not_an_object() {
        let errs = errors(&json!([1, 2, 3]));
        assert_eq!(errs.len(), 1);
        assert!(errs.iter().next().unwrap().path.is_root());
    }
}
