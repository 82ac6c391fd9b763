//! Dynamic library loading for foreign operations
//!
//! Opens a shared library with `libloading`, resolves the three operation
//! symbols and hands them out as [`ForeignOps`]. Handles platform-specific
//! library naming conventions and search paths.

use crate::error::LoadError;
use crate::ffi::invoker::ForeignOps;
use crate::ffi::types::{BlobOpFn, ScalarOpFn, StringListOpFn};
use handoff_config::{
    BridgeConfig, DEFAULT_BLOB_SYMBOL, DEFAULT_SCALAR_SYMBOL, DEFAULT_STRING_LIST_SYMBOL,
};
use libloading::Library;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exported names of the three foreign operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNames {
    pub scalar: String,
    pub string_list: String,
    pub blob: String,
}

impl Default for SymbolNames {
    fn default() -> Self {
        Self {
            scalar: DEFAULT_SCALAR_SYMBOL.to_string(),
            string_list: DEFAULT_STRING_LIST_SYMBOL.to_string(),
            blob: DEFAULT_BLOB_SYMBOL.to_string(),
        }
    }
}

impl SymbolNames {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            scalar: config.scalar_symbol().to_string(),
            string_list: config.string_list_symbol().to_string(),
            blob: config.blob_symbol().to_string(),
        }
    }
}

/// A loaded foreign library and its resolved operations
///
/// # Safety
///
/// Loading a dynamic library runs its initialization code in this process.
/// The library must be trusted and must export the operations with the
/// documented C signatures.
pub struct ForeignLibrary {
    path: PathBuf,
    ops: ForeignOps,
    // Dropped last; `ops` point into it
    _library: Library,
}

impl ForeignLibrary {
    /// Load `name` (a path or a short library name) and resolve `symbols`
    pub fn open(name: &str, symbols: &SymbolNames) -> Result<Arc<ForeignLibrary>, LoadError> {
        let path = resolve_library_path(name, &default_search_paths())
            .ok_or_else(|| LoadError::LibraryNotFound(name.to_string()))?;

        let library =
            unsafe { Library::new(&path).map_err(|e| LoadError::LoadFailed(e.to_string()))? };

        let ops = unsafe {
            ForeignOps::new()
                .with_scalar(lookup::<ScalarOpFn>(&library, name, &symbols.scalar)?)
                .with_string_list(lookup::<StringListOpFn>(&library, name, &symbols.string_list)?)
                .with_blob(lookup::<BlobOpFn>(&library, name, &symbols.blob)?)
        };

        tracing::debug!(path = %path.display(), "foreign library loaded");
        Ok(Arc::new(ForeignLibrary {
            path,
            ops,
            _library: library,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ops(&self) -> ForeignOps {
        self.ops
    }
}

impl fmt::Debug for ForeignLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignLibrary")
            .field("path", &self.path)
            .field("ops", &self.ops)
            .finish()
    }
}

/// # Safety
///
/// `T` must be the exact function pointer type of the exported symbol.
unsafe fn lookup<T: Copy>(library: &Library, name: &str, symbol: &str) -> Result<T, LoadError> {
    library
        .get::<T>(symbol.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| LoadError::SymbolNotFound {
            library: name.to_string(),
            symbol: symbol.to_string(),
        })
}

/// Platform-specific library search paths, current directory first
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/lib64"));
        paths.push(PathBuf::from("/lib"));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
        paths.push(PathBuf::from("/usr/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(system_root) = std::env::var("SystemRoot") {
            paths.push(PathBuf::from(system_root).join("System32"));
        }
    }

    paths
}

/// Candidate file names for a short library name
///
/// - Linux: lib{name}.so
/// - macOS: lib{name}.dylib or lib{name}.so
/// - Windows: {name}.dll
fn candidate_file_names(name: &str) -> Vec<String> {
    let extensions: &[&str] = if cfg!(target_os = "windows") {
        &["dll"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else {
        &["so"]
    };
    let prefixes: &[&str] = if cfg!(target_os = "windows") {
        &["", "lib"]
    } else {
        &["lib", ""]
    };

    prefixes
        .iter()
        .flat_map(|prefix| {
            extensions
                .iter()
                .map(move |ext| format!("{}{}.{}", prefix, name, ext))
        })
        .collect()
}

fn resolve_library_path(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 || path.extension().is_some() {
        return path.exists().then(|| path.to_path_buf());
    }

    let candidates = candidate_file_names(name);
    search_paths
        .iter()
        .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
        .find(|full| full.exists())
}
