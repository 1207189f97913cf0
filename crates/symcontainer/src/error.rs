//! Error types for the symbol container crate.
//!
//! Construction failures are reported as a batch of [`Diagnostic`]s, each
//! carrying a machine-readable [`ErrorKind`] and the [`DocPath`] of the
//! offending element. Query failures are plain `*NotFound` variants of
//! [`IsfError`].

use std::fmt;
use thiserror::Error;

/// Machine-readable category of a construction-pipeline violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Top-level or key-shape violation.
    MalformedDocument,
    /// Descriptor `kind` not recognized, or its payload does not match.
    UnknownDescriptorVariant,
    /// A name not found in its target collection.
    UnresolvedReference,
    /// The same key appears twice in one JSON object.
    DuplicateName,
    /// A type embeds itself without a pointer or zero-length array.
    RecursiveLayout,
    /// Field offset + size exceeds the declared type length.
    OffsetOverflow,
    /// Bitfield range exceeds the bit width of its storage type.
    BitRangeOverflow,
    /// `metadata.format` outside the accepted pattern or range.
    VersionUnsupported,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedDocument => "MalformedDocument",
            ErrorKind::UnknownDescriptorVariant => "UnknownDescriptorVariant",
            ErrorKind::UnresolvedReference => "UnresolvedReference",
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::RecursiveLayout => "RecursiveLayout",
            ErrorKind::OffsetOverflow => "OffsetOverflow",
            ErrorKind::BitRangeOverflow => "BitRangeOverflow",
            ErrorKind::VersionUnsupported => "VersionUnsupported",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a value inside the input document: the chain of object keys
/// (and array indices) from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn root() -> Self {
        DocPath(Vec::new())
    }

    /// A new path one level below this one.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.into());
        DocPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DocPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        DocPath(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            // Type names like `std::vector<int>` are fine bare; dots would be ambiguous.
            if segment.contains('.') || segment.is_empty() {
                write!(f, "[{:?}]", segment)?;
            } else {
                f.write_str(segment)?;
            }
        }
        Ok(())
    }
}

/// One violation found while building a container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {path}: {message}")]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub path: DocPath,
    /// The identifier the violation is about (missing name, recursive type), if any.
    pub subject: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, path: &DocPath, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            path: path.clone(),
            subject: None,
            message: message.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A batch of diagnostics from one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// True if any diagnostic in the batch has the given kind.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.0.iter().any(|d| d.kind == kind)
    }

    /// All diagnostics of the given kind.
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.kind == kind)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }

    /// `Ok(value)` when the batch is empty, otherwise the batch itself.
    pub fn finish<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(v: Vec<Diagnostic>) -> Self {
        Diagnostics(v)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s)", self.0.len())?;
        for d in &self.0 {
            write!(f, "\n  {}", d)?;
        }
        Ok(())
    }
}

/// ISF loading, construction and query errors.
#[derive(Debug, Error)]
pub enum IsfError {
    #[error("ISF file not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("XZ/LZMA decompression error: {0}")]
    Decompression(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("JSON encode error: {0}")]
    JsonEncode(String),

    #[error("invalid symbol container: {0}")]
    Invalid(Diagnostics),

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Base type not found: {0}")]
    BaseTypeNotFound(String),

    #[error("Enum not found: {0}")]
    EnumNotFound(String),

    #[error("Enum constant not found: {constant} in enum {enum_name}")]
    EnumConstantNotFound { enum_name: String, constant: String },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Field not found: {field} in type {type_name}")]
    FieldNotFound { type_name: String, field: String },

    #[error("No symbol at or below {0:#x}")]
    NoSymbolAtOrBelow(u64),
}

impl IsfError {
    /// The diagnostics batch, if this is a construction failure.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            IsfError::Invalid(d) => Some(d),
            _ => None,
        }
    }

    /// True for every query-side NotFound result.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IsfError::TypeNotFound(_)
                | IsfError::BaseTypeNotFound(_)
                | IsfError::EnumNotFound(_)
                | IsfError::EnumConstantNotFound { .. }
                | IsfError::SymbolNotFound(_)
                | IsfError::FieldNotFound { .. }
                | IsfError::NoSymbolAtOrBelow(_)
        )
    }
}

impl From<Diagnostics> for IsfError {
    fn from(d: Diagnostics) -> Self {
        IsfError::Invalid(d)
    }
}

pub type IsfResult<T> = Result<T, IsfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        let path = DocPath::root()
            .child("user_types")
            .child("_LIST_ENTRY")
            .child("fields")
            .child("Flink");
        assert_eq!(path.to_string(), "user_types._LIST_ENTRY.fields.Flink");
        assert_eq!(DocPath::root().to_string(), "<root>");

        let dotted = DocPath::root().child("symbols").child("a.b");
        assert_eq!(dotted.to_string(), "symbols.[\"a.b\"]");
    }

    #[test]
    fn test_diagnostic_display() {
        let path: DocPath = ["enums", "Color", "base"].into_iter().collect();
        let d = Diagnostic::new(ErrorKind::UnresolvedReference, &path, "unknown base type `int`")
            .with_subject("int");
        assert_eq!(
            d.to_string(),
            "UnresolvedReference at enums.Color.base: unknown base type `int`"
        );
        assert_eq!(d.subject.as_deref(), Some("int"));
    }

    #[test]
    fn test_batch_finish() {
        let empty = Diagnostics::new();
        assert_eq!(empty.finish(7), Ok(7));

        let mut batch = Diagnostics::new();
        batch.push(Diagnostic::new(ErrorKind::DuplicateName, &DocPath::root(), "dup"));
        let err = batch.finish(()).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err.contains(ErrorKind::DuplicateName));
        assert!(!err.contains(ErrorKind::OffsetOverflow));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(IsfError::TypeNotFound("x".into()).is_not_found());
        assert!(IsfError::NoSymbolAtOrBelow(0).is_not_found());
        assert!(!IsfError::Invalid(Diagnostics::new()).is_not_found());
        assert!(IsfError::Invalid(Diagnostics::new()).diagnostics().is_some());
    }
}
