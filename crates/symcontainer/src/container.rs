//! The resolved, validated, laid-out symbol container and its query API.

use crate::config::Options;
use crate::error::{Diagnostic, DocPath, ErrorKind, IsfError, IsfResult};
use crate::layout::{self, FieldLayout, TypeLayout};
use crate::resolve::{self, BaseTypeId, Descriptor, EnumId, ResolvedBase, ResolvedGraph, UserTypeId};
use crate::types::{
    BaseRef, BaseType, EnumType, FieldDef, IsfDocument, Metadata, Symbol, TypeDescriptor, UserType,
};
use crate::validate::{check_format, validate_document};
use semver::Version;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, info};

/// An enum after resolution, with constants ordered by value, then name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLayout {
    pub name: String,
    pub length: u64,
    pub base: BaseTypeId,
    pub base_name: String,
    pub base_size: u64,
    pub constants: Vec<(String, i128)>,
}

/// Result of a reverse address lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestSymbol<'a> {
    pub name: &'a str,
    pub symbol: &'a Symbol,
    /// How far past the symbol's address the queried address is.
    pub displacement: u64,
}

/// A fully built symbol container.
///
/// Immutable once constructed; every query is a pure read, so a container can
/// be shared across threads (e.g. behind an `Arc`) without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolContainer {
    graph: ResolvedGraph,
    layouts: Vec<TypeLayout>,
    enums: Vec<EnumLayout>,
    /// (address, name), sorted.
    by_address: Vec<(u64, String)>,
    format_version: Version,
    pointer_size: Option<u64>,
}

impl SymbolContainer {
    /// Build a container from a raw JSON document.
    pub fn from_value(raw: &Value, options: &Options) -> IsfResult<Self> {
        Self::build(raw, Vec::new(), options)
    }

    /// Build from a raw document plus duplicate-key findings from decoding.
    pub(crate) fn build(raw: &Value, duplicates: Vec<Diagnostic>, options: &Options) -> IsfResult<Self> {
        let doc = match validate_document(raw, options) {
            Ok(doc) if duplicates.is_empty() => doc,
            Ok(_) => return Err(IsfError::Invalid(duplicates.into())),
            Err(mut diags) => {
                diags.extend(duplicates);
                return Err(IsfError::Invalid(diags));
            }
        };
        Self::from_document(doc, options)
    }

    /// Build a container from an already typed document: resolve, then lay out.
    pub fn from_document(doc: IsfDocument, options: &Options) -> IsfResult<Self> {
        let format_version = check_format(&doc.metadata.format, &options.supported_formats).map_err(|msg| {
            let path = DocPath::root().child("metadata").child("format");
            IsfError::Invalid(vec![Diagnostic::new(ErrorKind::VersionUnsupported, &path, msg)].into())
        })?;

        let pointer_size = options
            .pointer_size
            .or_else(|| doc.base_types.get("pointer").map(|bt| bt.length));

        let graph = resolve::resolve(doc)?;
        let layouts = layout::lay_out(&graph, pointer_size)?;

        let enums = graph
            .enums
            .iter()
            .map(|e| {
                let base = graph.base(e.base);
                let mut constants = e.constants.clone();
                constants.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
                EnumLayout {
                    name: e.name.clone(),
                    length: e.length,
                    base: e.base,
                    base_name: base.name.clone(),
                    base_size: base.length,
                    constants,
                }
            })
            .collect();

        let mut by_address: Vec<(u64, String)> = graph
            .symbols
            .iter()
            .map(|(name, s)| (s.address, name.clone()))
            .collect();
        by_address.sort();

        info!(
            format = %format_version,
            base_types = graph.base_types.len(),
            user_types = layouts.len(),
            enums = graph.enums.len(),
            symbols = by_address.len(),
            "symbol container built"
        );

        Ok(SymbolContainer {
            graph,
            layouts,
            enums,
            by_address,
            format_version,
            pointer_size,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.graph.metadata
    }

    pub fn format_version(&self) -> &Version {
        &self.format_version
    }

    /// Pointer width in bytes, if configured or defined by the document.
    pub fn pointer_size(&self) -> Option<u64> {
        self.pointer_size
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Size of a base type.
    pub fn base_type_size(&self, name: &str) -> IsfResult<u64> {
        self.graph
            .base_index
            .get(name)
            .map(|id| self.graph.base(*id).length)
            .ok_or_else(|| IsfError::BaseTypeNotFound(name.to_string()))
    }

    /// Layout of a user type: fields ordered by offset with their sizes.
    pub fn user_type(&self, name: &str) -> IsfResult<&TypeLayout> {
        self.graph
            .user_index
            .get(name)
            .map(|id| &self.layouts[id.index()])
            .ok_or_else(|| IsfError::TypeNotFound(name.to_string()))
    }

    /// One field of a user type.
    pub fn field(&self, type_name: &str, field_name: &str) -> IsfResult<&FieldLayout> {
        self.user_type(type_name)?
            .field(field_name)
            .ok_or_else(|| IsfError::FieldNotFound {
                type_name: type_name.to_string(),
                field: field_name.to_string(),
            })
    }

    /// Size of a user type, base type or enum, looked up in that order.
    pub fn type_size(&self, name: &str) -> IsfResult<u64> {
        if let Ok(layout) = self.user_type(name) {
            Ok(layout.length)
        } else if let Ok(size) = self.base_type_size(name) {
            Ok(size)
        } else if let Ok(e) = self.enum_type(name) {
            Ok(e.length)
        } else {
            Err(IsfError::TypeNotFound(name.to_string()))
        }
    }

    /// Effective size of a resolved descriptor. `None` for functions.
    pub fn descriptor_size(&self, desc: &Descriptor) -> Option<u64> {
        layout::descriptor_size(&self.graph, self.pointer_size, desc)
    }

    pub fn base_type_by_id(&self, id: BaseTypeId) -> Option<&ResolvedBase> {
        self.graph.base_types.get(id.index())
    }

    pub fn user_type_by_id(&self, id: UserTypeId) -> Option<&TypeLayout> {
        self.layouts.get(id.index())
    }

    pub fn enum_by_id(&self, id: EnumId) -> Option<&EnumLayout> {
        self.enums.get(id.index())
    }

    pub fn base_type_names(&self) -> impl Iterator<Item = &str> {
        self.graph.base_types.iter().map(|b| b.name.as_str())
    }

    pub fn user_type_names(&self) -> impl Iterator<Item = &str> {
        self.layouts.iter().map(|l| l.name.as_str())
    }

    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.iter().map(|e| e.name.as_str())
    }

    /// Render a descriptor as a C-like type string, e.g. `struct Node *`,
    /// `char *[4]` or `int (*)[3]`.
    pub fn describe(&self, desc: &Descriptor) -> String {
        self.declare(desc, String::new())
    }

    /// `outer` is the declarator built so far, such as `*` or `[4]`.
    fn declare(&self, desc: &Descriptor, outer: String) -> String {
        let unknown = "<unknown>";
        let specifier = match desc {
            Descriptor::Pointer(target) => {
                let outer = if matches!(**target, Descriptor::Array { .. }) {
                    format!("(*{})", outer)
                } else {
                    format!("*{}", outer)
                };
                return self.declare(target, outer);
            }
            Descriptor::Array { count, element } => {
                return self.declare(element, format!("{}[{}]", outer, count));
            }
            Descriptor::Base(id) => self
                .base_type_by_id(*id)
                .map_or(unknown, |b| b.name.as_str())
                .to_string(),
            Descriptor::Compound { kind, id } => format!(
                "{} {}",
                kind,
                self.user_type_by_id(*id).map_or(unknown, |l| l.name.as_str())
            ),
            Descriptor::Enum(id) => format!(
                "enum {}",
                self.enum_by_id(*id).map_or(unknown, |e| e.name.as_str())
            ),
            Descriptor::Function => "function".to_string(),
            Descriptor::Bitfield {
                bit_position,
                bit_length,
                storage,
            } => format!(
                "{} : {} @ {}",
                self.base_type_by_id(*storage).map_or(unknown, |b| b.name.as_str()),
                bit_length,
                bit_position
            ),
        };
        if outer.is_empty() {
            specifier
        } else if outer.starts_with('[') {
            specifier + &outer
        } else {
            format!("{} {}", specifier, outer)
        }
    }

    // ------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------

    /// An enum: underlying base size and constants ordered by value.
    pub fn enum_type(&self, name: &str) -> IsfResult<&EnumLayout> {
        self.graph
            .enum_index
            .get(name)
            .map(|id| &self.enums[id.index()])
            .ok_or_else(|| IsfError::EnumNotFound(name.to_string()))
    }

    /// Value of one enum constant.
    pub fn enum_value(&self, enum_name: &str, constant: &str) -> IsfResult<i128> {
        self.enum_type(enum_name)?
            .constants
            .iter()
            .find(|(n, _)| n == constant)
            .map(|(_, v)| *v)
            .ok_or_else(|| IsfError::EnumConstantNotFound {
                enum_name: enum_name.to_string(),
                constant: constant.to_string(),
            })
    }

    /// Reverse-lookup an enum constant name by value. When several constants
    /// share the value, the alphabetically first one is returned.
    pub fn enum_constant_name(&self, enum_name: &str, value: i128) -> IsfResult<&str> {
        self.enum_type(enum_name)?
            .constants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
            .ok_or_else(|| IsfError::EnumConstantNotFound {
                enum_name: enum_name.to_string(),
                constant: value.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    pub fn symbol(&self, name: &str) -> IsfResult<&Symbol> {
        self.graph
            .symbols
            .get(name)
            .ok_or_else(|| IsfError::SymbolNotFound(name.to_string()))
    }

    pub fn symbol_address(&self, name: &str) -> IsfResult<u64> {
        self.symbol(name).map(|s| s.address)
    }

    pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
        self.graph.symbols.keys().map(String::as_str)
    }

    /// The symbol with the greatest address not above `address`. Among
    /// symbols sharing that address, the alphabetically first wins.
    pub fn symbol_at_or_below(&self, address: u64) -> IsfResult<NearestSymbol<'_>> {
        let end = self.by_address.partition_point(|(a, _)| *a <= address);
        if end == 0 {
            return Err(IsfError::NoSymbolAtOrBelow(address));
        }
        let found = self.by_address[end - 1].0;
        let first = self.by_address.partition_point(|(a, _)| *a < found);
        let name = self.by_address[first].1.as_str();
        let symbol = self.symbol(name)?;
        Ok(NearestSymbol {
            name,
            symbol,
            displacement: address - found,
        })
    }

    /// Symbols whose address lies in `range`, ascending by address then name.
    pub fn symbols_in_range(&self, range: Range<u64>) -> impl Iterator<Item = (&str, &Symbol)> {
        let start = self.by_address.partition_point(|(a, _)| *a < range.start);
        let end = self.by_address.partition_point(|(a, _)| *a < range.end);
        self.by_address[start..end.max(start)]
            .iter()
            .filter_map(|(_, name)| self.graph.symbols.get_key_value(name))
            .map(|(name, s)| (name.as_str(), s))
    }

    // ------------------------------------------------------------------
    // Re-serialization
    // ------------------------------------------------------------------

    /// The document this container describes.
    pub fn to_document(&self) -> IsfDocument {
        let base_types = self
            .graph
            .base_types
            .iter()
            .map(|b| (b.name.clone(), BaseType { length: b.length }))
            .collect();
        let user_types = self
            .layouts
            .iter()
            .map(|l| {
                let fields = l
                    .fields
                    .iter()
                    .map(|f| {
                        let def = FieldDef {
                            type_info: self.unresolve(&f.descriptor),
                            offset: f.offset,
                        };
                        (f.name.clone(), def)
                    })
                    .collect();
                let def = UserType {
                    kind: l.kind,
                    length: l.length,
                    fields,
                };
                (l.name.clone(), def)
            })
            .collect();
        let enums = self
            .enums
            .iter()
            .map(|e| {
                let def = EnumType {
                    length: e.length,
                    base: e.base_name.clone(),
                    constants: e.constants.iter().cloned().collect::<BTreeMap<_, _>>(),
                };
                (e.name.clone(), def)
            })
            .collect();
        debug!("re-serializing symbol container");
        IsfDocument {
            metadata: self.graph.metadata.clone(),
            base_types,
            user_types,
            enums,
            symbols: self.graph.symbols.clone(),
        }
    }

    pub fn to_json_value(&self) -> IsfResult<Value> {
        serde_json::to_value(self.to_document()).map_err(|e| IsfError::JsonEncode(e.to_string()))
    }

    pub fn to_json_string(&self) -> IsfResult<String> {
        serde_json::to_string_pretty(&self.to_document()).map_err(|e| IsfError::JsonEncode(e.to_string()))
    }

    /// Turn handles back into names. Only called with descriptors of this
    /// container, whose handles are always in range.
    fn unresolve(&self, desc: &Descriptor) -> TypeDescriptor {
        match desc {
            Descriptor::Pointer(target) => TypeDescriptor::pointer_to(self.unresolve(target)),
            Descriptor::Base(id) => TypeDescriptor::base(self.graph.base(*id).name.clone()),
            Descriptor::Array { count, element } => TypeDescriptor::array_of(*count, self.unresolve(element)),
            Descriptor::Compound { kind, id } => {
                TypeDescriptor::from_compound(*kind, self.graph.user(*id).name.clone())
            }
            Descriptor::Enum(id) => TypeDescriptor::Enum {
                name: self.graph.enumeration(*id).name.clone(),
            },
            Descriptor::Function => TypeDescriptor::Function,
            Descriptor::Bitfield {
                bit_position,
                bit_length,
                storage,
            } => TypeDescriptor::Bitfield {
                bit_position: *bit_position,
                bit_length: *bit_length,
                storage: BaseRef::new(self.graph.base(*storage).name.clone()),
            },
        }
    }
}

impl From<&SymbolContainer> for IsfDocument {
    fn from(container: &SymbolContainer) -> Self {
        container.to_document()
    }
}
