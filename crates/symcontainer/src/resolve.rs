//! Reference resolution: binds every name in a validated document to a handle.
//!
//! Runs in two passes. The first numbers the base types, user types and enums
//! (in key order). The second walks every field descriptor and every enum's
//! `base`, replacing names with [`BaseTypeId`] / [`UserTypeId`] / [`EnumId`]
//! handles and reporting each name that does not exist.

use crate::error::{Diagnostic, Diagnostics, DocPath, ErrorKind};
use crate::types::{IsfDocument, Metadata, Symbol, TypeDescriptor, UserKind};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Handle to a base type of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BaseTypeId(pub(crate) usize);

/// Handle to a user type of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserTypeId(pub(crate) usize);

/// Handle to an enum of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub(crate) usize);

impl BaseTypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl UserTypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl EnumId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A type descriptor whose names have been bound to handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Descriptor {
    Pointer(Box<Descriptor>),
    Base(BaseTypeId),
    Array {
        count: u64,
        element: Box<Descriptor>,
    },
    /// A struct, class or union. `kind` is the kind named by the reference.
    Compound {
        kind: UserKind,
        id: UserTypeId,
    },
    Enum(EnumId),
    Function,
    Bitfield {
        bit_position: u64,
        bit_length: u64,
        storage: BaseTypeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBase {
    pub name: String,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub name: String,
    pub offset: u64,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub name: String,
    pub kind: UserKind,
    pub length: u64,
    pub fields: Vec<ResolvedField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnum {
    pub name: String,
    pub length: u64,
    pub base: BaseTypeId,
    pub constants: Vec<(String, i128)>,
}

/// The fully linked type graph. Definitions live in arenas indexed by handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGraph {
    pub metadata: Metadata,
    pub base_types: Vec<ResolvedBase>,
    pub user_types: Vec<ResolvedUser>,
    pub enums: Vec<ResolvedEnum>,
    pub symbols: BTreeMap<String, Symbol>,
    pub base_index: HashMap<String, BaseTypeId>,
    pub user_index: HashMap<String, UserTypeId>,
    pub enum_index: HashMap<String, EnumId>,
}

impl ResolvedGraph {
    pub fn base(&self, id: BaseTypeId) -> &ResolvedBase {
        &self.base_types[id.0]
    }

    pub fn user(&self, id: UserTypeId) -> &ResolvedUser {
        &self.user_types[id.0]
    }

    pub fn enumeration(&self, id: EnumId) -> &ResolvedEnum {
        &self.enums[id.0]
    }
}

/// Resolve every named reference in `doc`.
pub fn resolve(doc: IsfDocument) -> Result<ResolvedGraph, Diagnostics> {
    let IsfDocument {
        metadata,
        base_types,
        user_types,
        enums,
        symbols,
    } = doc;

    // Pass 1: name → handle maps.
    let base_index: HashMap<String, BaseTypeId> = base_types
        .keys()
        .enumerate()
        .map(|(i, name)| (name.clone(), BaseTypeId(i)))
        .collect();
    let user_index: HashMap<String, UserTypeId> = user_types
        .keys()
        .enumerate()
        .map(|(i, name)| (name.clone(), UserTypeId(i)))
        .collect();
    let enum_index: HashMap<String, EnumId> = enums
        .keys()
        .enumerate()
        .map(|(i, name)| (name.clone(), EnumId(i)))
        .collect();

    // Pass 2: link.
    let mut linker = Linker {
        base_index: &base_index,
        user_index: &user_index,
        enum_index: &enum_index,
        user_kinds: user_types.values().map(|u| u.kind).collect(),
        diags: Diagnostics::new(),
    };

    let user_root = DocPath::root().child("user_types");
    let mut resolved_users = Vec::with_capacity(user_types.len());
    for (name, user) in user_types {
        let fields_path = user_root.child(name.as_str()).child("fields");
        let mut fields = Vec::with_capacity(user.fields.len());
        for (field_name, field) in user.fields {
            let type_path = fields_path.child(field_name.as_str()).child("type");
            if let Some(descriptor) = linker.link(&field.type_info, &type_path) {
                fields.push(ResolvedField {
                    name: field_name,
                    offset: field.offset,
                    descriptor,
                });
            }
        }
        resolved_users.push(ResolvedUser {
            name,
            kind: user.kind,
            length: user.length,
            fields,
        });
    }

    let enum_root = DocPath::root().child("enums");
    let mut resolved_enums = Vec::with_capacity(enums.len());
    for (name, def) in enums {
        let base_path = enum_root.child(name.as_str()).child("base");
        if let Some(base) = linker.base(&def.base, &base_path) {
            resolved_enums.push(ResolvedEnum {
                name,
                length: def.length,
                base,
                constants: def.constants.into_iter().collect(),
            });
        }
    }

    let diags = linker.diags;
    let resolved_bases = base_types
        .into_iter()
        .map(|(name, bt)| ResolvedBase {
            name,
            length: bt.length,
        })
        .collect();

    let graph = diags.finish(ResolvedGraph {
        metadata,
        base_types: resolved_bases,
        user_types: resolved_users,
        enums: resolved_enums,
        symbols,
        base_index,
        user_index,
        enum_index,
    })?;
    debug!(
        base_types = graph.base_types.len(),
        user_types = graph.user_types.len(),
        enums = graph.enums.len(),
        "all type references resolved"
    );
    Ok(graph)
}

struct Linker<'a> {
    base_index: &'a HashMap<String, BaseTypeId>,
    user_index: &'a HashMap<String, UserTypeId>,
    enum_index: &'a HashMap<String, EnumId>,
    user_kinds: Vec<UserKind>,
    diags: Diagnostics,
}

impl Linker<'_> {
    fn unresolved(&mut self, what: &str, name: &str, path: &DocPath) {
        self.diags.push(
            Diagnostic::new(
                ErrorKind::UnresolvedReference,
                path,
                format!("unknown {} `{}`", what, name),
            )
            .with_subject(name),
        );
    }

    fn base(&mut self, name: &str, path: &DocPath) -> Option<BaseTypeId> {
        let id = self.base_index.get(name).copied();
        if id.is_none() {
            self.unresolved("base type", name, path);
        }
        id
    }

    /// Link one descriptor, recursing through pointer and array subtypes.
    /// Keeps going after a failure so every missing name is reported.
    fn link(&mut self, desc: &TypeDescriptor, path: &DocPath) -> Option<Descriptor> {
        match desc {
            TypeDescriptor::Pointer { subtype } => {
                let target = self.link(subtype, &path.child("subtype"))?;
                Some(Descriptor::Pointer(Box::new(target)))
            }
            TypeDescriptor::Base { name } => self.base(name, &path.child("name")).map(Descriptor::Base),
            TypeDescriptor::Array { count, subtype } => {
                let element = self.link(subtype, &path.child("subtype"))?;
                Some(Descriptor::Array {
                    count: *count,
                    element: Box::new(element),
                })
            }
            TypeDescriptor::Struct { name }
            | TypeDescriptor::Class { name }
            | TypeDescriptor::Union { name } => {
                let kind = desc.compound().map_or(UserKind::Struct, |(k, _)| k);
                let Some(id) = self.user_index.get(name.as_str()).copied() else {
                    self.unresolved(kind.as_str(), name, &path.child("name"));
                    return None;
                };
                let defined = self.user_kinds[id.0];
                if defined != kind {
                    warn!(path = %path, "`{}` is referenced as {} but defined as {}", name, kind, defined);
                }
                Some(Descriptor::Compound { kind, id })
            }
            TypeDescriptor::Enum { name } => {
                let id = self.enum_index.get(name.as_str()).copied();
                if id.is_none() {
                    self.unresolved("enum", name, &path.child("name"));
                }
                id.map(Descriptor::Enum)
            }
            TypeDescriptor::Function => Some(Descriptor::Function),
            TypeDescriptor::Bitfield {
                bit_position,
                bit_length,
                storage,
            } => {
                let storage = self.base(storage.name(), &path.child("type").child("name"))?;
                Some(Descriptor::Bitfield {
                    bit_position: *bit_position,
                    bit_length: *bit_length,
                    storage,
                })
            }
        }
    }
}
