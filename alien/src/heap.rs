use log::{debug, trace};

use crate::{
    Alien, BigNum, ByteArray, Dll, Float, HeapObject, ObjectRef, ObjectType,
    Value, Visitable, Visitor,
};

// TODO: add growth control, the threshold is fixed for the lifetime of a heap
#[derive(Debug, Clone)]
pub struct HeapCreateInfo {
    /// bytes allocated since the last collection before the next one runs
    pub gc_threshold: usize,
    /// collect before every single allocation
    pub stress: bool,
}

impl Default for HeapCreateInfo {
    fn default() -> Self {
        Self {
            gc_threshold: 1024 * 1024,
            stress: false,
        }
    }
}

/// Anything that holds values the collector must treat as live.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn Visitor);
}

impl RootProvider for Vec<Value> {
    fn visit_roots(&mut self, visitor: &mut dyn Visitor) {
        self.iter().for_each(|&value| visitor.visit(value));
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct GarbageCollectionStats {
    pub collections: usize,
    pub objects_freed: usize,
    pub arrays_relocated: usize,
    pub bytes_relocated: usize,
}

#[derive(Debug)]
struct HeapEntry {
    object: HeapObject,
    marked: bool,
}

/// Object table with a moving collector.
///
/// Objects are addressed by [`ObjectRef`], which never changes. Collection frees
/// unreachable entries and moves the storage of every surviving byte array, so raw
/// data pointers must be re-read after anything that allocates.
#[derive(Debug)]
pub struct Heap {
    entries: Vec<Option<HeapEntry>>,
    free: Vec<u32>,
    allocated_since_collection: usize,
    info: HeapCreateInfo,
    stats: GarbageCollectionStats,
}

impl Heap {
    pub fn new(info: HeapCreateInfo) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            allocated_since_collection: 0,
            info,
            stats: GarbageCollectionStats::default(),
        }
    }

    /// Inserts `object`, possibly collecting first.
    /// Edges of `object` itself are kept alive across that collection.
    pub fn allocate(
        &mut self,
        object: HeapObject,
        roots: &mut dyn RootProvider,
    ) -> ObjectRef {
        let size = object.heap_size();
        if self.info.stress
            || self.allocated_since_collection + size > self.info.gc_threshold
        {
            self.collect_with(roots, Some(&object));
        }
        self.allocated_since_collection += size;

        let entry = HeapEntry {
            object,
            marked: false,
        };
        match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(entry);
                ObjectRef::new(index)
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Some(entry));
                ObjectRef::new(index)
            }
        }
    }

    pub fn allocate_bytearray(
        &mut self,
        data: &[u8],
        roots: &mut dyn RootProvider,
    ) -> Value {
        let object = HeapObject::ByteArray(ByteArray::new(data));
        self.allocate(object, roots).into()
    }

    pub fn allocate_dll(
        &mut self,
        dll: Dll,
        roots: &mut dyn RootProvider,
    ) -> ObjectRef {
        self.allocate(HeapObject::Dll(dll), roots)
    }

    /// Fixnum if it fits, bignum otherwise
    pub fn box_integer(
        &mut self,
        value: i128,
        roots: &mut dyn RootProvider,
    ) -> Value {
        if Value::fits_fixnum(value) {
            return Value::from_fixnum(value as i64);
        }
        let object = HeapObject::BigNum(BigNum { value });
        self.allocate(object, roots).into()
    }

    pub fn box_float(
        &mut self,
        value: f64,
        roots: &mut dyn RootProvider,
    ) -> Value {
        let object = HeapObject::Float(Float { value });
        self.allocate(object, roots).into()
    }

    pub fn collect(&mut self, roots: &mut dyn RootProvider) {
        self.collect_with(roots, None);
    }

    fn collect_with(
        &mut self,
        roots: &mut dyn RootProvider,
        pending: Option<&HeapObject>,
    ) {
        let mut worklist: Vec<ObjectRef> = Vec::new();
        let mut push = |value: Value| {
            if let Some(object) = value.as_object() {
                worklist.push(object);
            }
        };
        roots.visit_roots(&mut push);
        if let Some(pending) = pending {
            pending.visit_edges(&mut push);
        }

        self.mark(worklist);
        let freed = self.sweep();
        let (arrays, bytes) = self.relocate();
        self.fixup_addresses();

        self.allocated_since_collection = 0;
        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.arrays_relocated += arrays;
        self.stats.bytes_relocated += bytes;
        trace!(
            "gc #{}: freed {freed} objects, relocated {arrays} byte arrays ({bytes} bytes)",
            self.stats.collections
        );
    }

    fn mark(&mut self, mut worklist: Vec<ObjectRef>) {
        while let Some(object) = worklist.pop() {
            let Some(Some(entry)) = self.entries.get_mut(object.index()) else {
                continue;
            };
            if entry.marked {
                continue;
            }
            entry.marked = true;
            entry.object.visit_edges(&mut |value: Value| {
                if let Some(edge) = value.as_object() {
                    worklist.push(edge);
                }
            });
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            match slot {
                Some(entry) if entry.marked => entry.marked = false,
                Some(entry) => {
                    if let HeapObject::Dll(dll) = &entry.object
                        && dll.handle.is_loaded()
                    {
                        // the handle is not ours to release, only dlclose does that
                        debug!("dll #{index} became garbage while still loaded");
                    }
                    *slot = None;
                    self.free.push(index as u32);
                    freed += 1;
                }
                None => (),
            }
        }
        freed
    }

    fn relocate(&mut self) -> (usize, usize) {
        let mut arrays = 0;
        let mut bytes = 0;
        for entry in self.entries.iter_mut().flatten() {
            if let HeapObject::ByteArray(array) = &mut entry.object {
                bytes += array.relocate();
                arrays += 1;
            }
        }
        (arrays, bytes)
    }

    fn fixup_addresses(&mut self) {
        let derived: Vec<ObjectRef> = self
            .objects()
            .filter_map(|(object, heap_object)| match heap_object {
                HeapObject::Alien(alien) if alien.owner().is_some() => {
                    Some(object)
                }
                _ => None,
            })
            .collect();
        for alien in derived {
            self.update_address(alien);
        }
    }

    pub fn get(&self, object: ObjectRef) -> Option<&HeapObject> {
        self.entries
            .get(object.index())
            .and_then(Option::as_ref)
            .map(|entry| &entry.object)
    }

    pub fn get_mut(&mut self, object: ObjectRef) -> Option<&mut HeapObject> {
        self.entries
            .get_mut(object.index())
            .and_then(Option::as_mut)
            .map(|entry| &mut entry.object)
    }

    pub(crate) fn objects(
        &self,
    ) -> impl Iterator<Item = (ObjectRef, &HeapObject)> {
        self.entries.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|entry| (ObjectRef::new(index as u32), &entry.object))
        })
    }

    pub(crate) fn objects_mut(
        &mut self,
    ) -> impl Iterator<Item = (ObjectRef, &mut HeapObject)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_mut().map(|entry| {
                    (ObjectRef::new(index as u32), &mut entry.object)
                })
            })
    }

    pub fn object_type(&self, value: Value) -> Option<ObjectType> {
        let object = value.as_object()?;
        self.get(object).map(HeapObject::object_type)
    }

    pub fn bytearray(&self, value: Value) -> Option<&ByteArray> {
        match self.get(value.as_object()?)? {
            HeapObject::ByteArray(array) => Some(array),
            _ => None,
        }
    }

    pub fn alien(&self, value: Value) -> Option<&Alien> {
        match self.get(value.as_object()?)? {
            HeapObject::Alien(alien) => Some(alien),
            _ => None,
        }
    }

    pub fn dll(&self, value: Value) -> Option<&Dll> {
        match self.get(value.as_object()?)? {
            HeapObject::Dll(dll) => Some(dll),
            _ => None,
        }
    }

    pub fn dll_mut(&mut self, value: Value) -> Option<&mut Dll> {
        match self.get_mut(value.as_object()?)? {
            HeapObject::Dll(dll) => Some(dll),
            _ => None,
        }
    }

    /// fixnum or bignum
    pub fn integer_value(&self, value: Value) -> Option<i128> {
        if let Some(fixnum) = value.as_fixnum() {
            return Some(fixnum as i128);
        }
        match self.get(value.as_object()?)? {
            HeapObject::BigNum(big) => Some(big.value),
            _ => None,
        }
    }

    pub fn float_value(&self, value: Value) -> Option<f64> {
        match self.get(value.as_object()?)? {
            HeapObject::Float(float) => Some(float.value),
            _ => None,
        }
    }

    pub fn live_objects(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn stats(&self) -> GarbageCollectionStats {
        self.stats
    }
}
