//! Symbol container engine for ISF-style (Intermediate Symbol Format) files.
//!
//! A symbol container describes the type layout and symbol table of a
//! compiled binary: base types, structs/unions/classes, enums and addresses.
//! Building a [`SymbolContainer`] runs a fixed pipeline:
//!
//! 1. syntactic validation of the raw JSON value (closed key sets, descriptor shapes)
//! 2. reference resolution (every name bound to a handle)
//! 3. layout (field extents, bitfield ranges, recursive-embedding detection)
//!
//! Each stage reports all of its problems at once as [`Diagnostics`]; a stage
//! only runs if the previous one succeeded. The result is immutable and can be
//! queried from any number of threads.
//!
//! # Example
//!
//! ```rust,ignore
//! use symcontainer::{parse_isf_file, Options};
//!
//! let symbols = parse_isf_file("linux-5.15.json.xz", &Options::default())?;
//! let task_size = symbols.type_size("task_struct")?;
//! let pid = symbols.field("task_struct", "pid")?;
//! let nearest = symbols.symbol_at_or_below(0xffff_ffff_8100_0123)?;
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod layout;
pub mod parser;
pub mod raw;
pub mod resolve;
pub mod types;
pub mod validate;

// Re-export key types at crate root.
pub use config::Options;
pub use container::{EnumLayout, NearestSymbol, SymbolContainer};
pub use error::{Diagnostic, Diagnostics, DocPath, ErrorKind, IsfError, IsfResult};
pub use layout::{BitRange, FieldLayout, TypeLayout};
pub use parser::{parse_isf_bytes, parse_isf_file, parse_isf_str};
pub use resolve::{BaseTypeId, Descriptor, EnumId, UserTypeId};
pub use types::{BaseRef, BaseType, EnumType, FieldDef, IsfDocument, Metadata, Symbol, TypeDescriptor, UserKind, UserType};
pub use validate::validate_document;
