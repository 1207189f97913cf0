//! Construction options.

use semver::{Comparator, Op, Prerelease, VersionReq};

/// Settings that are not stored in the document itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Architecture pointer width in bytes. When `None`, the length of a base
    /// type named `pointer` is used, if the document defines one.
    pub pointer_size: Option<u64>,
    /// Format versions accepted once `metadata.format` matches the `0.x.y` pattern.
    pub supported_formats: VersionReq,
}

impl Options {
    pub fn with_pointer_size(mut self, pointer_size: u64) -> Self {
        self.pointer_size = Some(pointer_size);
        self
    }

    pub fn with_supported_formats(mut self, req: VersionReq) -> Self {
        self.supported_formats = req;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            pointer_size: None,
            supported_formats: default_supported_formats(),
        }
    }
}

/// `>=0.1.0, <1.0.0`
pub fn default_supported_formats() -> VersionReq {
    let bound = |op, major, minor| Comparator {
        op,
        major,
        minor: Some(minor),
        patch: Some(0),
        pre: Prerelease::EMPTY,
    };
    VersionReq {
        comparators: vec![bound(Op::GreaterEq, 0, 1), bound(Op::Less, 1, 0)],
    }
}
