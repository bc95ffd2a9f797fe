mod accessors;
mod alien;
mod bytecode;
mod error;
mod heap;
mod interpreter;
mod library;
mod loader;
mod objects;
mod primitives;
mod stack;
mod tagged;
mod visitor;
mod vm;

pub use accessors::*;
pub use alien::*;
pub use bytecode::*;
pub use error::RuntimeError;
pub use heap::{GarbageCollectionStats, Heap, HeapCreateInfo, RootProvider};
pub use interpreter::*;
pub use library::{LibraryRef, RestoreReport};
pub use loader::{DynamicLoader, NativeHandle, SymbolLookup, SystemLoader};
pub use objects::{
    HeapObject, ObjectType,
    aliens::Alien,
    bytearrays::ByteArray,
    dlls::{Dll, LibraryHandle},
    numbers::{BigNum, Float},
};
pub use primitives::*;
pub use stack::*;
pub use tagged::*;
pub use visitor::{Visitable, Visitor};
pub use vm::*;
