//! Binding native shared libraries: open, symbol lookup, close, validity.
//!
//! Missing symbols and unloaded libraries are answered with `f`, only values of
//! the wrong kind raise errors.

use std::path::PathBuf;

use log::debug;

use crate::{
    Dll, HeapObject, LibraryHandle, ObjectRef, RootProvider, RuntimeError,
    SymbolLookup, VM, Value,
};

/// What a library argument can be.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LibraryRef {
    /// `f`: the global namespace of the process, always available
    Global,
    Library(ObjectRef),
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub expired_addresses: usize,
    pub reopened: usize,
    pub failed: usize,
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};
    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

impl VM {
    pub fn classify_library(
        &self,
        value: Value,
    ) -> Result<LibraryRef, RuntimeError> {
        if value.is_false() {
            return Ok(LibraryRef::Global);
        }
        match value.as_object() {
            Some(object) if self.heap.dll(value).is_some() => {
                Ok(LibraryRef::Library(object))
            }
            _ => Err(RuntimeError::type_mismatch("dll", value)),
        }
    }

    fn c_string(&self, value: Value) -> Result<Vec<u8>, RuntimeError> {
        self.heap
            .bytearray(value)
            .map(|bytes| bytes.c_bytes().to_vec())
            .ok_or(RuntimeError::type_mismatch("byte-array", value))
    }

    fn open_handle(&self, path: Value) -> LibraryHandle {
        let Ok(bytes) = self.c_string(path) else {
            return LibraryHandle::default();
        };
        let path = path_from_bytes(&bytes);
        match self.loader.open(&path) {
            Some(handle) => LibraryHandle::loaded(handle),
            None => LibraryHandle::default(),
        }
    }

    /// Makes a dll object for `path`. A library that fails to load still
    /// yields a dll, just one that is not valid.
    pub fn open_library(
        &mut self,
        path: Value,
        roots: &mut dyn RootProvider,
    ) -> Result<Value, RuntimeError> {
        if self.heap.bytearray(path).is_none() {
            return Err(RuntimeError::type_mismatch("byte-array", path));
        }
        let library = self.heap.allocate_dll(Dll::new(path), roots);
        let handle = self.open_handle(path);
        debug!(
            "open library #{}: loaded = {}",
            library.index(),
            handle.is_loaded()
        );
        if let Some(HeapObject::Dll(dll)) = self.heap.get_mut(library) {
            dll.handle = handle;
        }
        Ok(library.into())
    }

    /// Looks `name` up in `library` (or globally for `f`).
    /// Answers an absolute alien, or `f` when the symbol or the library is missing.
    pub fn resolve_symbol(
        &mut self,
        library: Value,
        name: Value,
        lookup: SymbolLookup,
        roots: &mut dyn RootProvider,
    ) -> Result<Value, RuntimeError> {
        let name = self.c_string(name)?;
        let handle = match self.classify_library(library)? {
            LibraryRef::Global => None,
            LibraryRef::Library(_) => {
                match self.heap.dll(library).and_then(|dll| dll.handle.get()) {
                    Some(handle) => Some(handle),
                    None => return Ok(Value::FALSE),
                }
            }
        };

        let Some(address) = self.loader.lookup(handle, &name, lookup) else {
            debug!("dlsym {}: not found", String::from_utf8_lossy(&name));
            return Ok(Value::FALSE);
        };
        debug!("dlsym {}: {address:#x}", String::from_utf8_lossy(&name));
        Ok(self.heap.derive_absolute(address, roots))
    }

    /// Releases the native handle. Closing a closed library does nothing.
    pub fn close_library(&mut self, library: Value) -> Result<(), RuntimeError> {
        let dll = self
            .heap
            .dll_mut(library)
            .ok_or(RuntimeError::type_mismatch("dll", library))?;
        if let Some(handle) = dll.handle.take() {
            self.loader.close(handle);
        }
        Ok(())
    }

    /// `f` is always valid, a dll is valid while its handle is loaded.
    pub fn is_library_valid(&self, library: Value) -> Result<bool, RuntimeError> {
        match self.classify_library(library)? {
            LibraryRef::Global => Ok(true),
            LibraryRef::Library(_) => Ok(self
                .heap
                .dll(library)
                .is_some_and(|dll| dll.handle.is_loaded())),
        }
    }

    /// Brings the heap back in line with a fresh native side, e.g. after a
    /// snapshot was loaded into a new process. Absolute aliens point into the
    /// old address space and expire, every dll is reopened from its path.
    pub fn restore_native_state(&mut self) -> RestoreReport {
        let mut report = RestoreReport {
            expired_addresses: self.heap.expire_external_addresses(),
            ..Default::default()
        };

        let libraries: Vec<ObjectRef> = self
            .heap
            .objects()
            .filter_map(|(object, heap_object)| match heap_object {
                HeapObject::Dll(_) => Some(object),
                _ => None,
            })
            .collect();

        for library in libraries {
            let value = Value::from_ref(library);
            let Some(dll) = self.heap.dll_mut(value) else {
                continue;
            };
            let path = dll.path;
            if let Some(stale) = dll.handle.take() {
                self.loader.close(stale);
            }
            let handle = self.open_handle(path);
            if handle.is_loaded() {
                report.reopened += 1;
            } else {
                report.failed += 1;
            }
            if let Some(dll) = self.heap.dll_mut(value) {
                dll.handle = handle;
            }
        }

        debug!(
            "restored native state: {} addresses expired, {} libraries reopened, {} failed",
            report.expired_addresses, report.reopened, report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{HeapCreateInfo, SystemLoader, loader::testing::StaticLoader};

    const FOO: usize = 0x10_0000;
    const BAR: usize = 0x10_0040;
    const PUTS: usize = 0x20_0000;

    fn setup(stress: bool) -> (VM, Arc<StaticLoader>, Vec<Value>) {
        let loader = Arc::new(
            StaticLoader::new()
                .with_library("libfoo.so", &[("foo", FOO), ("_bar", BAR)])
                .with_global("puts", PUTS),
        );
        let info = HeapCreateInfo {
            stress,
            ..Default::default()
        };
        (VM::new(info, loader.clone()), loader, Vec::new())
    }

    fn bytes(vm: &mut VM, roots: &mut Vec<Value>, data: &[u8]) -> Value {
        let value = vm.heap.allocate_bytearray(data, roots);
        roots.push(value);
        value
    }

    fn open(vm: &mut VM, roots: &mut Vec<Value>, path: &str) -> Value {
        let path = bytes(vm, roots, format!("{path}\0").as_bytes());
        let library = vm.open_library(path, roots).unwrap();
        roots.push(library);
        library
    }

    fn symbol(
        vm: &mut VM,
        roots: &mut Vec<Value>,
        library: Value,
        name: &str,
        lookup: SymbolLookup,
    ) -> Value {
        let name = bytes(vm, roots, name.as_bytes());
        vm.resolve_symbol(library, name, lookup, roots).unwrap()
    }

    #[test]
    fn open_resolve_and_derive() {
        let (mut vm, _, mut roots) = setup(false);
        let library = open(&mut vm, &mut roots, "libfoo.so");
        assert_eq!(vm.is_library_valid(library), Ok(true));

        let foo = symbol(&mut vm, &mut roots, library, "foo", SymbolLookup::Plain);
        let alien = vm.heap.alien(foo).unwrap();
        assert_eq!(alien.owner(), None);
        assert_eq!(alien.address(), FOO);
        roots.push(foo);

        let displaced = vm.heap.derive(foo, 8, &mut roots).unwrap();
        let displaced = vm.heap.alien(displaced).unwrap();
        assert_eq!(displaced.owner(), None);
        assert_eq!(displaced.address(), FOO + 8);
    }

    #[test]
    fn missing_symbol_is_f() {
        let (mut vm, _, mut roots) = setup(false);
        let library = open(&mut vm, &mut roots, "libfoo.so");
        let missing = symbol(&mut vm, &mut roots, library, "nope", SymbolLookup::Plain);
        assert_eq!(missing, Value::FALSE);
    }

    #[test]
    fn raw_lookup_skips_decoration() {
        let (mut vm, _, mut roots) = setup(false);
        let library = open(&mut vm, &mut roots, "libfoo.so");
        let plain = symbol(&mut vm, &mut roots, library, "bar", SymbolLookup::Plain);
        assert_eq!(vm.heap.alien(plain).map(|a| a.address()), Some(BAR));
        let raw = symbol(&mut vm, &mut roots, library, "bar", SymbolLookup::Raw);
        assert_eq!(raw, Value::FALSE);
    }

    #[test]
    fn global_namespace_is_valid_and_resolvable() {
        let (mut vm, _, mut roots) = setup(false);
        assert_eq!(vm.is_library_valid(Value::FALSE), Ok(true));

        let puts = symbol(&mut vm, &mut roots, Value::FALSE, "puts", SymbolLookup::Plain);
        let alien = vm.heap.alien(puts).unwrap();
        assert_eq!(alien.owner(), None);
        assert_eq!(alien.address(), PUTS);

        let missing = symbol(&mut vm, &mut roots, Value::FALSE, "foo", SymbolLookup::Raw);
        assert_eq!(missing, Value::FALSE);
    }

    #[test]
    fn close_invalidates_and_is_idempotent() {
        let (mut vm, loader, mut roots) = setup(false);
        let library = open(&mut vm, &mut roots, "libfoo.so");

        vm.close_library(library).unwrap();
        assert_eq!(vm.is_library_valid(library), Ok(false));
        assert_eq!(
            symbol(&mut vm, &mut roots, library, "foo", SymbolLookup::Plain),
            Value::FALSE
        );
        assert_eq!(
            symbol(&mut vm, &mut roots, library, "foo", SymbolLookup::Raw),
            Value::FALSE
        );

        vm.close_library(library).unwrap();
        assert_eq!(vm.is_library_valid(library), Ok(false));
        assert_eq!(loader.closes(), 1);
    }

    #[test]
    fn failed_open_yields_an_invalid_library() {
        let (mut vm, loader, mut roots) = setup(false);
        let library = open(&mut vm, &mut roots, "libmissing.so");
        assert_eq!(vm.heap.object_type(library), Some(crate::ObjectType::Dll));
        assert_eq!(vm.is_library_valid(library), Ok(false));
        assert_eq!(
            symbol(&mut vm, &mut roots, library, "foo", SymbolLookup::Plain),
            Value::FALSE
        );
        vm.close_library(library).unwrap();
        assert_eq!(loader.closes(), 0);
    }

    #[test]
    fn library_keeps_its_path_through_collections() {
        let (mut vm, _, mut roots) = setup(true);
        let path = vm.heap.allocate_bytearray(b"libfoo.so\0", &mut roots);
        // only the dll references the path
        let library = vm.open_library(path, &mut roots).unwrap();
        roots.push(library);
        vm.heap.collect(&mut roots);

        let dll = vm.heap.dll(library).unwrap();
        assert_eq!(vm.heap.bytearray(dll.path).unwrap().c_bytes(), b"libfoo.so");
        assert_eq!(vm.is_library_valid(library), Ok(true));
    }

    #[test]
    fn wrong_kinds_are_type_mismatches() {
        let (mut vm, _, mut roots) = setup(false);
        let name = bytes(&mut vm, &mut roots, b"foo");
        let fixnum = Value::from_fixnum(1);

        assert_eq!(
            vm.open_library(fixnum, &mut roots),
            Err(RuntimeError::type_mismatch("byte-array", fixnum))
        );
        assert_eq!(
            vm.resolve_symbol(fixnum, name, SymbolLookup::Plain, &mut roots),
            Err(RuntimeError::type_mismatch("dll", fixnum))
        );
        assert_eq!(
            vm.resolve_symbol(Value::FALSE, fixnum, SymbolLookup::Plain, &mut roots),
            Err(RuntimeError::type_mismatch("byte-array", fixnum))
        );
        assert_eq!(
            vm.close_library(Value::FALSE),
            Err(RuntimeError::type_mismatch("dll", Value::FALSE))
        );
        assert_eq!(
            vm.is_library_valid(name),
            Err(RuntimeError::type_mismatch("dll", name))
        );
    }

    #[test]
    fn restore_expires_absolute_addresses_and_reopens_libraries() {
        let (mut vm, loader, mut roots) = setup(false);
        let open_lib = open(&mut vm, &mut roots, "libfoo.so");
        let closed_lib = open(&mut vm, &mut roots, "libfoo.so");
        let broken_lib = open(&mut vm, &mut roots, "libmissing.so");
        vm.close_library(closed_lib).unwrap();

        let foo = symbol(&mut vm, &mut roots, open_lib, "foo", SymbolLookup::Plain);
        roots.push(foo);
        let buffer = bytes(&mut vm, &mut roots, &[0; 8]);
        let derived = vm.heap.derive(buffer, 4, &mut roots).unwrap();
        roots.push(derived);

        let report = vm.restore_native_state();
        assert_eq!(
            report,
            RestoreReport {
                expired_addresses: 1,
                reopened: 2,
                failed: 1,
            }
        );
        assert!(vm.heap.alien(foo).unwrap().is_expired());
        assert!(!vm.heap.alien(derived).unwrap().is_expired());
        assert_eq!(
            vm.heap.resolve_pinned(foo),
            Err(RuntimeError::ExpiredResource { value: foo })
        );

        assert_eq!(vm.is_library_valid(open_lib), Ok(true));
        assert_eq!(vm.is_library_valid(closed_lib), Ok(true));
        assert_eq!(vm.is_library_valid(broken_lib), Ok(false));
        assert_eq!(loader.open_libraries(), 2);
        assert_eq!(loader.opens(), 4);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn system_loader_binds_a_real_library() {
        let loader = Arc::new(SystemLoader::new());
        let info = HeapCreateInfo {
            stress: true,
            ..Default::default()
        };
        let mut vm = VM::new(info, loader.clone());
        let mut roots: Vec<Value> = Vec::new();

        let path = vm.heap.allocate_bytearray(b"libc.so.6", &mut roots);
        roots.push(path);
        let library = vm.open_library(path, &mut roots).unwrap();
        roots.push(library);
        assert_eq!(vm.is_library_valid(library), Ok(true));
        assert_eq!(loader.open_count(), 1);

        let name = vm.heap.allocate_bytearray(b"malloc", &mut roots);
        roots.push(name);
        let malloc = vm
            .resolve_symbol(library, name, SymbolLookup::Raw, &mut roots)
            .unwrap();
        let alien = vm.heap.alien(malloc).expect("malloc should resolve");
        assert_eq!(alien.owner(), None);
        assert_ne!(alien.address(), 0);

        vm.close_library(library).unwrap();
        vm.close_library(library).unwrap();
        assert_eq!(loader.open_count(), 0);
        assert_eq!(vm.is_library_valid(library), Ok(false));
        assert_eq!(
            vm.resolve_symbol(library, name, SymbolLookup::Raw, &mut roots),
            Ok(Value::FALSE)
        );
    }
}
