//! Container model: the typed form of a symbol container document.
//!
//! Everything here still refers to other definitions by name. Names are bound
//! to handles only by the resolver (`crate::resolve`), since forward references
//! are legal anywhere in a document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level symbol container document.
///
/// Collections are `BTreeMap`s: document order carries no meaning, and sorted
/// keys give reproducible diagnostics and query listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsfDocument {
    pub metadata: Metadata,
    pub base_types: BTreeMap<String, BaseType>,
    pub user_types: BTreeMap<String, UserType>,
    pub enums: BTreeMap<String, EnumType>,
    pub symbols: BTreeMap<String, Symbol>,
}

/// Document metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Format version, `0.<minor>.<patch>`.
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<Producer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Spelling used by dwarf2json and similar producers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

/// A base (primitive) type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseType {
    /// Size in bytes.
    pub length: u64,
}

/// Aggregate kind of a user type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Struct,
    Union,
    Class,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Struct => "struct",
            UserKind::Union => "union",
            UserKind::Class => "class",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "struct" => Some(UserKind::Struct),
            "union" => Some(UserKind::Union),
            "class" => Some(UserKind::Class),
            _ => None,
        }
    }
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-defined struct, union or class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserType {
    pub kind: UserKind,
    /// Declared total size in bytes.
    pub length: u64,
    pub fields: BTreeMap<String, FieldDef>,
}

/// A field within a user type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub type_info: TypeDescriptor,
    /// Byte offset from the start of the enclosing type.
    pub offset: u64,
}

/// What kind of thing a value is. Recursive through pointers and arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDescriptor {
    Pointer {
        subtype: Box<TypeDescriptor>,
    },
    Base {
        name: String,
    },
    Array {
        count: u64,
        subtype: Box<TypeDescriptor>,
    },
    Struct {
        name: String,
    },
    Class {
        name: String,
    },
    Union {
        name: String,
    },
    Enum {
        name: String,
    },
    Function,
    Bitfield {
        bit_position: u64,
        bit_length: u64,
        #[serde(rename = "type")]
        storage: BaseRef,
    },
}

impl TypeDescriptor {
    /// The `kind` discriminator as it appears in the document.
    pub fn kind_str(&self) -> &'static str {
        match self {
            TypeDescriptor::Pointer { .. } => "pointer",
            TypeDescriptor::Base { .. } => "base",
            TypeDescriptor::Array { .. } => "array",
            TypeDescriptor::Struct { .. } => "struct",
            TypeDescriptor::Class { .. } => "class",
            TypeDescriptor::Union { .. } => "union",
            TypeDescriptor::Enum { .. } => "enum",
            TypeDescriptor::Function => "function",
            TypeDescriptor::Bitfield { .. } => "bitfield",
        }
    }

    /// For struct/class/union references: the aggregate kind and target name.
    pub fn compound(&self) -> Option<(UserKind, &str)> {
        match self {
            TypeDescriptor::Struct { name } => Some((UserKind::Struct, name)),
            TypeDescriptor::Class { name } => Some((UserKind::Class, name)),
            TypeDescriptor::Union { name } => Some((UserKind::Union, name)),
            _ => None,
        }
    }

    /// Build a struct/class/union reference.
    pub fn from_compound(kind: UserKind, name: impl Into<String>) -> Self {
        let name = name.into();
        match kind {
            UserKind::Struct => TypeDescriptor::Struct { name },
            UserKind::Class => TypeDescriptor::Class { name },
            UserKind::Union => TypeDescriptor::Union { name },
        }
    }

    pub fn base(name: impl Into<String>) -> Self {
        TypeDescriptor::Base { name: name.into() }
    }

    pub fn pointer_to(subtype: TypeDescriptor) -> Self {
        TypeDescriptor::Pointer {
            subtype: Box::new(subtype),
        }
    }

    pub fn array_of(count: u64, subtype: TypeDescriptor) -> Self {
        TypeDescriptor::Array {
            count,
            subtype: Box::new(subtype),
        }
    }
}

/// Storage of a bitfield. Only a `base` descriptor is allowed here, so the
/// model has a single variant and cannot hold anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BaseRef {
    Base { name: String },
}

impl BaseRef {
    pub fn new(name: impl Into<String>) -> Self {
        BaseRef::Base { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            BaseRef::Base { name } => name,
        }
    }
}

/// An enumeration type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    /// Size of the underlying integer in bytes.
    pub length: u64,
    /// Name of the underlying base type.
    pub base: String,
    /// Constant name to value. Values need not be unique and span both the
    /// signed and the unsigned 64-bit range.
    pub constants: BTreeMap<String, i128>,
}

/// A symbol (named address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkage_name: Option<String>,
}
