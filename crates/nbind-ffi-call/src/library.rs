//! Shared library loading.

use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;

use crate::{LibraryError, SymbolSource};

/// A loaded shared library, usable as a [`SymbolSource`]. Its id is the path
/// it was loaded from.
pub struct Library {
    library: libloading::Library,
    path: String,
}

impl Library {
    /// Loads a library from an exact path.
    ///
    /// Loading runs the library's initialization routines; the caller vouches
    /// for the library the same way it vouches for every signature it binds.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let library = unsafe { libloading::Library::new(path) }.map_err(|source| LibraryError {
            path: shown.clone(),
            source,
        })?;
        tracing::debug!(path = %shown, "loaded native library");
        Ok(Self {
            library,
            path: shown,
        })
    }

    /// Loads a library by base name (`"m"` becomes `libm.so`, `libm.dylib`
    /// or `m.dll`), searching the platform's default locations.
    pub fn load_by_name(name: &str) -> Result<Self, LibraryError> {
        Self::load(platform_lib_name(name))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

impl SymbolSource for Library {
    fn id(&self) -> &str {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the symbol is only read as an address; calling it goes
        // through a declared signature.
        let found = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) };
        match found {
            Ok(address) => NonNull::new(*address),
            Err(err) => {
                tracing::trace!(path = %self.path, symbol, error = %err, "symbol lookup failed");
                None
            }
        }
    }
}

fn platform_lib_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else {
        format!("lib{name}.so")
    }
}
