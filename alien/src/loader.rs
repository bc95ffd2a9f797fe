use std::{collections::HashMap, ffi::c_void, fmt, path::Path};

use libloading::Library;
use log::{debug, warn};
use parking_lot::Mutex;

/// Opaque token for a library opened by a [`DynamicLoader`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }
}

/// Which loader entry point a symbol lookup goes through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolLookup {
    Plain,
    Raw,
}

/// The OS side of dynamic linking.
///
/// A `None` handle means the global namespace of the running process.
/// Lookups return `None` for a missing symbol, never an error.
pub trait DynamicLoader: Send + Sync + fmt::Debug {
    fn open(&self, path: &Path) -> Option<NativeHandle>;

    /// Exact symbol name only.
    fn resolve_raw(&self, handle: Option<NativeHandle>, name: &[u8]) -> Option<usize>;

    fn close(&self, handle: NativeHandle);

    /// Exact name first, then the C-decorated name with a leading underscore.
    fn resolve(&self, handle: Option<NativeHandle>, name: &[u8]) -> Option<usize> {
        self.resolve_raw(handle, name).or_else(|| {
            let mut decorated = Vec::with_capacity(name.len() + 1);
            decorated.push(b'_');
            decorated.extend_from_slice(name);
            self.resolve_raw(handle, &decorated)
        })
    }

    fn lookup(
        &self,
        handle: Option<NativeHandle>,
        name: &[u8],
        lookup: SymbolLookup,
    ) -> Option<usize> {
        match lookup {
            SymbolLookup::Plain => self.resolve(handle, name),
            SymbolLookup::Raw => self.resolve_raw(handle, name),
        }
    }
}

#[derive(Debug)]
struct LoaderState {
    next: usize,
    libraries: HashMap<usize, Library>,
    process: Option<Library>,
}

/// [`DynamicLoader`] backed by the platform's dynamic linker.
#[derive(Debug)]
pub struct SystemLoader {
    state: Mutex<LoaderState>,
}

impl Default for SystemLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemLoader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoaderState {
                next: 1,
                libraries: HashMap::new(),
                process: process_library(),
            }),
        }
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().libraries.len()
    }
}

fn process_library() -> Option<Library> {
    #[cfg(unix)]
    {
        Some(libloading::os::unix::Library::this().into())
    }
    #[cfg(windows)]
    {
        libloading::os::windows::Library::this().ok().map(Library::from)
    }
    #[cfg(not(any(unix, windows)))]
    {
        None
    }
}

impl DynamicLoader for SystemLoader {
    fn open(&self, path: &Path) -> Option<NativeHandle> {
        // SAFETY: running library initializers is what opening a library means
        match unsafe { Library::new(path) } {
            Ok(library) => {
                let mut state = self.state.lock();
                let id = state.next;
                state.next += 1;
                state.libraries.insert(id, library);
                debug!("dlopen {}: handle {id}", path.display());
                Some(NativeHandle(id))
            }
            Err(err) => {
                warn!("dlopen {}: {err}", path.display());
                None
            }
        }
    }

    fn resolve_raw(&self, handle: Option<NativeHandle>, name: &[u8]) -> Option<usize> {
        let state = self.state.lock();
        let library = match handle {
            Some(handle) => state.libraries.get(&handle.0)?,
            None => state.process.as_ref()?,
        };
        // SAFETY: the symbol is only read as an address, never called or dereferenced here
        let symbol = unsafe { library.get::<*mut c_void>(name) }.ok()?;
        let address = *symbol as usize;
        (address != 0).then_some(address)
    }

    fn close(&self, handle: NativeHandle) {
        // dropping the library closes it
        if self.state.lock().libraries.remove(&handle.0).is_some() {
            debug!("dlclose handle {}", handle.0);
        }
    }
}
