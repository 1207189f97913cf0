//! Layout engine: sizes, field extents, bit ranges and recursion checks.
//!
//! A user type's size is its declared `length`; what has to be computed is
//! whether every field fits inside it, and whether the declared graph can
//! have a finite size at all. User types are visited depth-first with a
//! three-state mark. Reaching a type that is still in progress through a
//! direct embedding (or an array with a non-zero count) is a recursive layout.
//! Pointers and zero-length arrays contribute a fixed size and are not
//! followed.

use crate::error::{Diagnostic, Diagnostics, DocPath, ErrorKind};
use crate::resolve::{BaseTypeId, Descriptor, ResolvedField, ResolvedGraph, ResolvedUser, UserTypeId};
use crate::types::UserKind;
use tracing::{debug, warn};

/// Bit geometry of a bitfield inside its storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitRange {
    pub position: u64,
    pub length: u64,
}

impl BitRange {
    /// One past the last bit.
    pub fn end(&self) -> u64 {
        self.position + self.length
    }

    /// Bytes touched, counted from the start of the storage unit.
    pub fn storage_bytes(&self) -> u64 {
        self.end().div_ceil(8)
    }

    /// Mask selecting the field's bits, when the range fits in 64 bits.
    pub fn mask(&self) -> Option<u64> {
        if self.end() > 64 {
            return None;
        }
        let ones = if self.length == 64 {
            u64::MAX
        } else {
            (1u64 << self.length) - 1
        };
        Some(ones << self.position)
    }
}

/// One field after layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub name: String,
    /// Byte offset from the start of the enclosing type.
    pub offset: u64,
    /// Effective size in bytes. `None` for function-typed values.
    pub size: Option<u64>,
    pub descriptor: Descriptor,
    pub bits: Option<BitRange>,
}

impl FieldLayout {
    /// One past the last byte, when the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|s| self.offset + s)
    }
}

/// A user type after layout. Fields are ordered by offset, then bit position,
/// then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeLayout {
    pub name: String,
    pub kind: UserKind,
    pub length: u64,
    pub fields: Vec<FieldLayout>,
}

impl TypeLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Effective size of a descriptor in an already laid-out graph. Handles
/// that do not belong to `graph` have no size.
pub fn descriptor_size(graph: &ResolvedGraph, pointer_size: Option<u64>, desc: &Descriptor) -> Option<u64> {
    match desc {
        Descriptor::Pointer(_) => pointer_size,
        Descriptor::Base(id) => graph.base_types.get(id.index()).map(|b| b.length),
        Descriptor::Array { count: 0, .. } => Some(0),
        Descriptor::Array { count, element } => {
            descriptor_size(graph, pointer_size, element)?.checked_mul(*count)
        }
        Descriptor::Compound { id, .. } => graph.user_types.get(id.index()).map(|u| u.length),
        Descriptor::Enum(id) => graph.enums.get(id.index()).map(|e| e.length),
        Descriptor::Function => None,
        Descriptor::Bitfield {
            bit_position,
            bit_length,
            ..
        } => bit_position.checked_add(*bit_length).map(|end| end.div_ceil(8)),
    }
}

/// Lay out every user type of `graph`. Returns layouts indexed by
/// [`UserTypeId`], or every layout violation found.
pub fn lay_out(graph: &ResolvedGraph, pointer_size: Option<u64>) -> Result<Vec<TypeLayout>, Diagnostics> {
    let count = graph.user_types.len();
    let mut engine = LayoutEngine {
        graph,
        pointer_size,
        marks: vec![Mark::Unvisited; count],
        stack: Vec::new(),
        layouts: vec![None; count],
        missing_pointer_reported: false,
        diags: Diagnostics::new(),
    };
    for i in 0..count {
        engine.run(UserTypeId(i));
    }

    let LayoutEngine { layouts, diags, .. } = engine;
    let layouts = diags.finish(layouts)?;
    debug!(user_types = layouts.len(), "layout complete");
    // Every type was visited, so every slot is filled.
    Ok(layouts.into_iter().flatten().collect())
}

/// The user type whose size `desc` depends on, if any.
fn embedded(desc: &Descriptor) -> Option<UserTypeId> {
    match desc {
        Descriptor::Compound { id, .. } => Some(*id),
        Descriptor::Array { count, element } if *count > 0 => embedded(element),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// A user type whose fields are being laid out.
struct Frame {
    id: UserTypeId,
    /// Index of the next field to lay out.
    next: usize,
    fields: Vec<FieldLayout>,
}

struct LayoutEngine<'g> {
    graph: &'g ResolvedGraph,
    pointer_size: Option<u64>,
    marks: Vec<Mark>,
    /// Types currently in progress, outermost first.
    stack: Vec<Frame>,
    layouts: Vec<Option<TypeLayout>>,
    missing_pointer_reported: bool,
    diags: Diagnostics,
}

impl<'g> LayoutEngine<'g> {
    fn report(&mut self, kind: ErrorKind, path: &DocPath, message: impl Into<String>) {
        self.diags.push(Diagnostic::new(kind, path, message));
    }

    /// Lay out `root` and everything it embeds. A field whose embedded type
    /// is unvisited suspends its frame until that type is done, so embedding
    /// depth costs heap, not call stack.
    fn run(&mut self, root: UserTypeId) {
        if self.marks[root.0] != Mark::Unvisited {
            return;
        }
        self.enter(root);
        let graph = self.graph;
        while let Some(frame) = self.stack.last() {
            let user = graph.user(frame.id);
            let Some(field) = user.fields.get(frame.next) else {
                if let Some(frame) = self.stack.pop() {
                    self.finish(frame);
                }
                continue;
            };
            if let Some(target) = embedded(&field.descriptor) {
                if self.marks[target.0] == Mark::Unvisited {
                    self.enter(target);
                    continue;
                }
            }
            let layout = self.lay_out_field(user, field);
            if let Some(frame) = self.stack.last_mut() {
                frame.fields.push(layout);
                frame.next += 1;
            }
        }
    }

    fn enter(&mut self, id: UserTypeId) {
        self.marks[id.0] = Mark::InProgress;
        let fields = Vec::with_capacity(self.graph.user(id).fields.len());
        self.stack.push(Frame { id, next: 0, fields });
    }

    fn finish(&mut self, frame: Frame) {
        let user = self.graph.user(frame.id);
        let mut fields = frame.fields;
        fields.sort_by(|a, b| {
            let bit = |f: &FieldLayout| f.bits.map_or(0, |b| b.position);
            (a.offset, bit(a), &a.name).cmp(&(b.offset, bit(b), &b.name))
        });
        self.marks[frame.id.0] = Mark::Done;
        self.layouts[frame.id.0] = Some(TypeLayout {
            name: user.name.clone(),
            kind: user.kind,
            length: user.length,
            fields,
        });
    }

    /// Report an embedding of `id` while `id` is still in progress.
    fn recursion(&mut self, id: UserTypeId, path: &DocPath) {
        let graph = self.graph;
        let start = self.stack.iter().position(|f| f.id == id).unwrap_or(0);
        let mut chain: Vec<&str> = self.stack[start..]
            .iter()
            .map(|f| graph.user(f.id).name.as_str())
            .collect();
        let name = graph.user(id).name.as_str();
        chain.push(name);
        let message = format!("`{}` contains itself without indirection: {}", name, chain.join(" -> "));
        self.diags
            .push(Diagnostic::new(ErrorKind::RecursiveLayout, path, message).with_subject(name));
    }

    fn pointer_width(&mut self, path: &DocPath) -> Option<u64> {
        if self.pointer_size.is_none() && !self.missing_pointer_reported {
            self.missing_pointer_reported = true;
            self.report(
                ErrorKind::MalformedDocument,
                path,
                "pointer width is unknown: no pointer size configured and no `pointer` base type",
            );
        }
        self.pointer_size
    }

    /// Effective size of `desc`. Embedded user types have already been
    /// entered by `run`; one still in progress is a recursive layout.
    fn size_of(&mut self, desc: &Descriptor, path: &DocPath) -> Option<u64> {
        match desc {
            Descriptor::Pointer(_) => self.pointer_width(path),
            Descriptor::Base(id) => Some(self.graph.base(*id).length),
            Descriptor::Array { count: 0, .. } => Some(0),
            Descriptor::Array { count, element } => {
                let element_size = self.size_of(element, &path.child("subtype"))?;
                let total = element_size.checked_mul(*count);
                if total.is_none() {
                    self.report(
                        ErrorKind::OffsetOverflow,
                        path,
                        format!("array of {} x {} bytes overflows the address space", count, element_size),
                    );
                }
                total
            }
            Descriptor::Compound { id, .. } => {
                if self.marks[id.0] == Mark::InProgress {
                    self.recursion(*id, path);
                }
                Some(self.graph.user(*id).length)
            }
            Descriptor::Enum(id) => Some(self.graph.enumeration(*id).length),
            Descriptor::Function => None,
            Descriptor::Bitfield {
                bit_position,
                bit_length,
                ..
            } => bit_position.checked_add(*bit_length).map(|end| end.div_ceil(8)),
        }
    }

    /// Check every bitfield reachable inside `desc`, including those behind
    /// pointers, which `size_of` does not follow.
    fn check_bit_ranges(&mut self, desc: &Descriptor, path: &DocPath) {
        match desc {
            Descriptor::Pointer(target) => self.check_bit_ranges(target, &path.child("subtype")),
            Descriptor::Array { element, .. } => self.check_bit_ranges(element, &path.child("subtype")),
            Descriptor::Bitfield {
                bit_position,
                bit_length,
                storage,
            } => self.check_bit_range(*bit_position, *bit_length, *storage, path),
            _ => {}
        }
    }

    fn check_bit_range(&mut self, position: u64, length: u64, storage: BaseTypeId, path: &DocPath) {
        let base = self.graph.base(storage);
        let width = base.length.saturating_mul(8);
        match position.checked_add(length) {
            Some(end) if end <= width => {}
            end => {
                let end = end.map_or_else(|| "overflow".to_string(), |e| e.to_string());
                self.report(
                    ErrorKind::BitRangeOverflow,
                    path,
                    format!(
                        "bits {}+{} (end {}) exceed the {} bits of `{}`",
                        position, length, end, width, base.name
                    ),
                );
            }
        }
    }

    fn lay_out_field(&mut self, user: &'g ResolvedUser, field: &'g ResolvedField) -> FieldLayout {
        let field_path = DocPath::root()
            .child("user_types")
            .child(user.name.as_str())
            .child("fields")
            .child(field.name.as_str());
        let type_path = field_path.child("type");

        self.check_bit_ranges(&field.descriptor, &type_path);
        let size = self.size_of(&field.descriptor, &type_path);

        match size {
            Some(size) if user.kind == UserKind::Union && size > user.length => {
                self.report(
                    ErrorKind::OffsetOverflow,
                    &field_path,
                    format!(
                        "member `{}` is {} bytes but union `{}` is only {}",
                        field.name, size, user.name, user.length
                    ),
                );
            }
            Some(size) => {
                if field.offset.checked_add(size).map_or(true, |end| end > user.length) {
                    self.report(
                        ErrorKind::OffsetOverflow,
                        &field_path,
                        format!(
                            "field `{}` at offset {} with size {} exceeds `{}` length {}",
                            field.name, field.offset, size, user.name, user.length
                        ),
                    );
                }
            }
            None => {
                if field.offset > user.length {
                    self.report(
                        ErrorKind::OffsetOverflow,
                        &field_path,
                        format!(
                            "field `{}` at offset {} starts past `{}` length {}",
                            field.name, field.offset, user.name, user.length
                        ),
                    );
                }
            }
        }
        if user.kind == UserKind::Union && field.offset != 0 {
            warn!(path = %field_path, offset = field.offset, "union member does not start at offset 0");
        }

        let bits = match field.descriptor {
            Descriptor::Bitfield {
                bit_position,
                bit_length,
                ..
            } => Some(BitRange {
                position: bit_position,
                length: bit_length,
            }),
            _ => None,
        };
        FieldLayout {
            name: field.name.clone(),
            offset: field.offset,
            size,
            descriptor: field.descriptor.clone(),
            bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::resolve::resolve;
    use crate::validate::validate_document;
    use serde_json::{json, Value};

    fn graph(user_types: Value) -> ResolvedGraph {
        let doc = json!({
            "metadata": { "format": "0.1.0" },
            "base_types": {
                "char": { "length": 1 },
                "short": { "length": 2 },
                "int": { "length": 4 },
                "long long": { "length": 8 }
            },
            "user_types": user_types,
            "enums": { "E": { "length": 4, "base": "int", "constants": {} } },
            "symbols": {}
        });
        resolve(validate_document(&doc, &Options::default()).unwrap()).unwrap()
    }

    fn field(kind: Value, offset: u64) -> Value {
        json!({ "type": kind, "offset": offset })
    }

    #[test]
    fn test_layout_orders_fields_and_sizes_them() {
        let g = graph(json!({
            "Inner": { "kind": "struct", "length": 4, "fields": {
                "x": field(json!({ "kind": "base", "name": "int" }), 0)
            } },
            "Outer": { "kind": "struct", "length": 40, "fields": {
                "z_first": field(json!({ "kind": "base", "name": "char" }), 0),
                "inner": field(json!({ "kind": "struct", "name": "Inner" }), 4),
                "arr": field(json!({ "kind": "array", "count": 3, "subtype": { "kind": "base", "name": "long long" } }), 8),
                "ptr": field(json!({ "kind": "pointer", "subtype": { "kind": "function" } }), 32),
                "e": field(json!({ "kind": "enum", "name": "E" }), 1)
            } }
        }));
        let layouts = lay_out(&g, Some(8)).unwrap();
        let outer = &layouts[g.user_index["Outer"].index()];
        let names: Vec<&str> = outer.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z_first", "e", "inner", "arr", "ptr"]);
        assert_eq!(outer.field("arr").unwrap().size, Some(24));
        assert_eq!(outer.field("ptr").unwrap().size, Some(8));
        assert_eq!(outer.field("inner").unwrap().end(), Some(8));
        assert_eq!(outer.field("e").unwrap().size, Some(4));
    }

    #[test]
    fn test_offset_overflow() {
        let g = graph(json!({
            "S": { "kind": "struct", "length": 8, "fields": {
                "a": field(json!({ "kind": "base", "name": "int" }), 0),
                "b": field(json!({ "kind": "base", "name": "long long" }), 4)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        assert_eq!(errs.len(), 1);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.kind, ErrorKind::OffsetOverflow);
        assert_eq!(d.path.to_string(), "user_types.S.fields.b");
    }

    #[test]
    fn test_union_members() {
        let g = graph(json!({
            "U": { "kind": "union", "length": 4, "fields": {
                "i": field(json!({ "kind": "base", "name": "int" }), 0),
                "s": field(json!({ "kind": "base", "name": "short" }), 2),
                "big": field(json!({ "kind": "base", "name": "long long" }), 0)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        // `s` at offset 2 is advisory only; `big` does not fit.
        assert_eq!(errs.len(), 1);
        let d = errs.iter().next().unwrap();
        assert_eq!(d.kind, ErrorKind::OffsetOverflow);
        assert!(d.message.contains("union"));
    }

    #[test]
    fn test_self_embedding_is_recursive() {
        let g = graph(json!({
            "Node": { "kind": "struct", "length": 16, "fields": {
                "value": field(json!({ "kind": "base", "name": "int" }), 0),
                "next": field(json!({ "kind": "struct", "name": "Node" }), 8)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        let d = errs.of_kind(ErrorKind::RecursiveLayout).next().unwrap();
        assert_eq!(d.subject.as_deref(), Some("Node"));
        assert_eq!(d.path.to_string(), "user_types.Node.fields.next.type");
        assert!(d.message.contains("Node -> Node"));
    }

    #[test]
    fn test_mutual_embedding_reported_once() {
        let g = graph(json!({
            "A": { "kind": "struct", "length": 8, "fields": {
                "b": field(json!({ "kind": "struct", "name": "B" }), 0)
            } },
            "B": { "kind": "union", "length": 8, "fields": {
                "a": field(json!({ "kind": "array", "count": 1, "subtype": { "kind": "struct", "name": "A" } }), 0)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        assert_eq!(errs.of_kind(ErrorKind::RecursiveLayout).count(), 1);
        let d = errs.of_kind(ErrorKind::RecursiveLayout).next().unwrap();
        assert!(d.message.contains("A -> B -> A"));
    }

    fn chain(depth: usize, close: bool) -> Value {
        let mut types = serde_json::Map::new();
        for i in 0..depth {
            let next = if i + 1 < depth {
                format!("T{}", i + 1)
            } else if close {
                "T0".to_string()
            } else {
                let leaf = field(json!({ "kind": "base", "name": "int" }), 0);
                types.insert(format!("T{}", i), json!({ "kind": "struct", "length": 4, "fields": { "x": leaf } }));
                continue;
            };
            let inner = field(json!({ "kind": "struct", "name": next }), 0);
            types.insert(format!("T{}", i), json!({ "kind": "struct", "length": 4, "fields": { "inner": inner } }));
        }
        Value::Object(types)
    }

    #[test]
    fn test_deep_embedding_chain() {
        let g = graph(chain(20_000, false));
        let layouts = lay_out(&g, Some(8)).unwrap();
        assert_eq!(layouts.len(), 20_000);
        let first = &layouts[g.user_index["T0"].index()];
        assert_eq!(first.field("inner").unwrap().size, Some(4));
    }

    #[test]
    fn test_deep_embedding_cycle() {
        let g = graph(chain(5_000, true));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        assert_eq!(errs.len(), 1);
        let d = errs.of_kind(ErrorKind::RecursiveLayout).next().unwrap();
        assert_eq!(d.subject.as_deref(), Some("T0"));
        assert!(d.message.contains("T0 -> T1 -> T2"));
        assert!(d.message.ends_with("T4999 -> T0"));
    }

    #[test]
    fn test_indirection_breaks_cycles() {
        let g = graph(json!({
            "A": { "kind": "struct", "length": 16, "fields": {
                "b": field(json!({ "kind": "pointer", "subtype": { "kind": "struct", "name": "B" } }), 0),
                "tail": field(json!({ "kind": "array", "count": 0, "subtype": { "kind": "struct", "name": "A" } }), 8)
            } },
            "B": { "kind": "struct", "length": 16, "fields": {
                "a": field(json!({ "kind": "struct", "name": "A" }), 0)
            } }
        }));
        let layouts = lay_out(&g, Some(8)).unwrap();
        let a = &layouts[g.user_index["A"].index()];
        assert_eq!(a.field("tail").unwrap().size, Some(0));
    }

    #[test]
    fn test_bit_ranges() {
        let g = graph(json!({
            "Flags": { "kind": "struct", "length": 4, "fields": {
                "low": field(json!({ "kind": "bitfield", "bit_position": 0, "bit_length": 4,
                                    "type": { "kind": "base", "name": "int" } }), 0),
                "high": field(json!({ "kind": "bitfield", "bit_position": 20, "bit_length": 12,
                                     "type": { "kind": "base", "name": "int" } }), 0)
            } }
        }));
        let layouts = lay_out(&g, Some(8)).unwrap();
        let flags = &layouts[0];
        assert_eq!(flags.fields[0].name, "low");
        let high = flags.field("high").unwrap();
        assert_eq!(high.bits, Some(BitRange { position: 20, length: 12 }));
        assert_eq!(high.size, Some(4));
        assert_eq!(high.bits.unwrap().mask(), Some(0xFFF0_0000));
        assert_eq!(flags.field("low").unwrap().size, Some(1));
    }

    #[test]
    fn test_bit_range_overflow() {
        let g = graph(json!({
            "Flags": { "kind": "struct", "length": 8, "fields": {
                "bad": field(json!({ "kind": "bitfield", "bit_position": 28, "bit_length": 8,
                                    "type": { "kind": "base", "name": "int" } }), 0),
                "hidden": field(json!({ "kind": "pointer", "subtype": { "kind": "bitfield", "bit_position": 6,
                    "bit_length": 4, "type": { "kind": "base", "name": "char" } } }), 0)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        assert_eq!(errs.of_kind(ErrorKind::BitRangeOverflow).count(), 2);
        assert!(errs.iter().any(|d| d.message.contains("28+8")));
    }

    #[test]
    fn test_pointer_width_required() {
        let g = graph(json!({
            "P": { "kind": "struct", "length": 16, "fields": {
                "a": field(json!({ "kind": "pointer", "subtype": { "kind": "base", "name": "int" } }), 0),
                "b": field(json!({ "kind": "pointer", "subtype": { "kind": "base", "name": "int" } }), 8)
            } }
        }));
        let errs = lay_out(&g, None).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs.iter().next().unwrap().kind, ErrorKind::MalformedDocument);
        assert!(lay_out(&g, Some(4)).is_ok());
    }

    #[test]
    fn test_function_field() {
        let g = graph(json!({
            "Vt": { "kind": "struct", "length": 8, "fields": {
                "f": field(json!({ "kind": "function" }), 8),
                "g": field(json!({ "kind": "function" }), 9)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs.iter().next().unwrap().path.to_string(), "user_types.Vt.fields.g");
    }

    #[test]
    fn test_array_size_overflow() {
        let g = graph(json!({
            "Huge": { "kind": "struct", "length": 8, "fields": {
                "a": field(json!({ "kind": "array", "count": u64::MAX, "subtype": { "kind": "base", "name": "int" } }), 0)
            } }
        }));
        let errs = lay_out(&g, Some(8)).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs.iter().next().unwrap().kind, ErrorKind::OffsetOverflow);
    }
}
