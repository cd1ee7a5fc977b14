//! Input-artifact scanner: implicit-dependency discovery (`spec.md` §4.4)
//! against the plug-in ABI described in §6.

pub mod error;
pub mod plugin;
pub mod resolve;
pub mod scan;

pub use error::{Result, ScannerError};
pub use plugin::{ScanHandle, ScannedReference, ScannerPlugin};
pub use resolve::{flatten_include_paths, resolve_reference};
pub use scan::refresh_implicit_children;
