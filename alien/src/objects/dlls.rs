use crate::{NativeHandle, Value, Visitable, Visitor};

/// Native library handle with an explicit lifetime.
///
/// Starts out not loaded. [`take`](Self::take) hands the native handle out exactly
/// once, so closing twice is a no-op instead of a double free.
#[derive(Debug, Default)]
pub struct LibraryHandle(Option<NativeHandle>);

impl LibraryHandle {
    pub fn loaded(handle: NativeHandle) -> Self {
        Self(Some(handle))
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.0.is_some()
    }

    #[inline]
    pub fn get(&self) -> Option<NativeHandle> {
        self.0
    }

    pub fn take(&mut self) -> Option<NativeHandle> {
        self.0.take()
    }
}

#[derive(Debug)]
pub struct Dll {
    /// byte array holding the load path
    pub path: Value,
    pub handle: LibraryHandle,
}

impl Dll {
    pub fn new(path: Value) -> Self {
        Self {
            path,
            handle: LibraryHandle::default(),
        }
    }
}

impl Visitable for Dll {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self.path);
    }
}
