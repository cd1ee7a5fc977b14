//! Scanner plug-in ABI (`spec.md` §6, "Scanner plug-in ABI (consumed)").
//!
//! The real ABI is a C-style `open`/`next`/`close` handle protocol meant for
//! dynamically loaded plug-ins; this crate consumes it read-only, so it is
//! modeled here as a plain Rust trait pair rather than re-deriving the raw
//! pointer/handle dance — the trait boundary *is* the ABI boundary for every
//! caller inside this workspace.

use bg_core::FileTag;
use std::path::Path;

/// One resolved reference returned by [`ScanHandle::next`]: the include text
/// as written in the source (`"foo.h"` or `<foo.h>`) plus whether it used
/// quote syntax (`spec.md` §6: "`flags & LOCAL_INCLUDE_FLAG` distinguishes
/// `\"a\"` from `<a>` includes").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedReference {
    pub include_text: String,
    pub is_local_include: bool,
}

/// An open scan session over one file (`spec.md` §6: `open` → `next`* →
/// `close`).
pub trait ScanHandle {
    /// Returns the next raw dependency reference, or `None` once
    /// enumeration ends (`spec.md` §6: "null ends enumeration").
    fn next(&mut self) -> Option<ScannedReference>;

    /// Optional tag-inferring hook consulted by the AutoTag pre-pass
    /// (`spec.md` §4.7, §6 `additional_file_tags`).
    fn additional_file_tags(&mut self) -> Vec<FileTag> {
        Vec::new()
    }
}

/// A scanner plug-in (`spec.md` §4.4, §6): advertises the file tag it
/// matches plus the `uses_cpp_include_paths`/`recursive` flag bits, and can
/// `open` a scan session over a file path.
pub trait ScannerPlugin: Send + Sync {
    fn file_tag(&self) -> FileTag;
    fn uses_cpp_include_paths(&self) -> bool {
        false
    }
    fn recursive(&self) -> bool {
        false
    }
    fn open(&self, path: &Path) -> Option<Box<dyn ScanHandle>>;
}
