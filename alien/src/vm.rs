use std::sync::Arc;

use crate::{DynamicLoader, ExecutionStateInfo, Heap, HeapCreateInfo};

#[derive(Debug, Clone, Default)]
pub struct VMCreateInfo {
    pub heap: HeapCreateInfo,
    pub stack: ExecutionStateInfo,
}

/// Heap plus the loader used to reach native code.
#[derive(Debug)]
pub struct VM {
    pub heap: Heap,
    pub loader: Arc<dyn DynamicLoader>,
}

impl VM {
    pub fn new(heap: HeapCreateInfo, loader: Arc<dyn DynamicLoader>) -> Self {
        Self {
            heap: Heap::new(heap),
            loader,
        }
    }
}
