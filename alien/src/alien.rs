//! Foreign addresses: resolving address-like values to raw pointers and
//! deriving new aliens from buffers, other aliens or raw addresses.
//!
//! Anything that allocates can move byte array storage. Resolve as the last
//! step before touching memory and never keep a resolved pointer across an
//! allocation.

use crate::{
    Alien, Heap, HeapObject, ObjectRef, RootProvider, RuntimeError, Value,
};

/// The only kinds of values that can stand for an address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressLike {
    /// `f`, the null pointer
    Absent,
    ManagedBuffer(ObjectRef),
    ForeignAddress(ObjectRef),
}

const ADDRESS_LIKE: &str = "foreign-address-like";

impl Heap {
    pub fn classify_address(
        &self,
        value: Value,
    ) -> Result<AddressLike, RuntimeError> {
        if value.is_false() {
            return Ok(AddressLike::Absent);
        }
        let object = value
            .as_object()
            .ok_or(RuntimeError::type_mismatch(ADDRESS_LIKE, value))?;
        match self.get(object) {
            Some(HeapObject::ByteArray(_)) => {
                Ok(AddressLike::ManagedBuffer(object))
            }
            Some(HeapObject::Alien(_)) => Ok(AddressLike::ForeignAddress(object)),
            _ => Err(RuntimeError::type_mismatch(ADDRESS_LIKE, value)),
        }
    }

    /// Recomputes the cached address of `alien` from its owner's current
    /// location. The only place the cached address is written.
    pub fn update_address(&mut self, alien: ObjectRef) -> Option<usize> {
        let owner = match self.get(alien)? {
            HeapObject::Alien(alien) => alien.owner(),
            _ => return None,
        };
        let owner_data = match owner {
            Some(owner) => match self.get(owner) {
                Some(HeapObject::ByteArray(array)) => Some(array.data_ptr()),
                other => {
                    debug_assert!(false, "alien owner must be a byte array, got {other:?}");
                    None
                }
            },
            None => None,
        };
        match self.get_mut(alien)? {
            HeapObject::Alien(alien) => {
                alien.set_address(owner_data);
                Some(alien.address())
            }
            _ => None,
        }
    }

    /// Address of an address-like value, valid until the next allocation.
    pub fn resolve(&mut self, value: Value) -> Result<*mut u8, RuntimeError> {
        match self.classify_address(value)? {
            AddressLike::Absent => Ok(std::ptr::null_mut()),
            AddressLike::ManagedBuffer(object) => match self.get(object) {
                Some(HeapObject::ByteArray(array)) => Ok(array.data_ptr()),
                _ => Err(RuntimeError::type_mismatch(ADDRESS_LIKE, value)),
            },
            AddressLike::ForeignAddress(object) => self
                .update_address(object)
                .map(|address| address as *mut u8)
                .ok_or(RuntimeError::type_mismatch(ADDRESS_LIKE, value)),
        }
    }

    /// Address of a value that is about to be kept across code that may collect.
    ///
    /// Only absolute aliens and `f` qualify. Byte arrays and aliens into byte
    /// arrays move, so they are rejected instead of handing out a pointer that
    /// silently goes stale.
    pub fn resolve_pinned(&self, value: Value) -> Result<*mut u8, RuntimeError> {
        match self.classify_address(value)? {
            AddressLike::Absent => Ok(std::ptr::null_mut()),
            AddressLike::ManagedBuffer(_) => {
                Err(RuntimeError::type_mismatch(ADDRESS_LIKE, value))
            }
            AddressLike::ForeignAddress(object) => {
                let Some(HeapObject::Alien(alien)) = self.get(object) else {
                    return Err(RuntimeError::type_mismatch(ADDRESS_LIKE, value));
                };
                if alien.is_expired() {
                    return Err(RuntimeError::ExpiredResource { value });
                }
                if alien.owner().is_some() {
                    return Err(RuntimeError::type_mismatch(ADDRESS_LIKE, value));
                }
                Ok(alien.address() as *mut u8)
            }
        }
    }

    /// Makes an alien pointing `displacement` bytes past `delegate`.
    ///
    /// A zero displacement on `f` or an alien returns `delegate` itself.
    /// Deriving from an alien composes the displacements onto its owner, so
    /// the owner of the result is never an alien.
    pub fn derive(
        &mut self,
        delegate: Value,
        displacement: isize,
        roots: &mut dyn RootProvider,
    ) -> Result<Value, RuntimeError> {
        let (owner, displacement) = match self.classify_address(delegate)? {
            AddressLike::Absent | AddressLike::ForeignAddress(_)
                if displacement == 0 =>
            {
                return Ok(delegate);
            }
            AddressLike::Absent => (None, displacement),
            AddressLike::ManagedBuffer(buffer) => (Some(buffer), displacement),
            AddressLike::ForeignAddress(object) => {
                let Some(HeapObject::Alien(base)) = self.get(object) else {
                    return Err(RuntimeError::type_mismatch(
                        ADDRESS_LIKE,
                        delegate,
                    ));
                };
                (base.owner(), base.displacement().wrapping_add(displacement))
            }
        };

        // the owner is an edge of the pending alien, it survives a collection here
        let alien = self.allocate(
            HeapObject::Alien(Alien::new(owner, displacement)),
            roots,
        );
        self.update_address(alien);
        Ok(alien.into())
    }

    /// Wraps a pointer obtained outside the heap. A null pointer yields `f`.
    pub fn derive_absolute(
        &mut self,
        address: usize,
        roots: &mut dyn RootProvider,
    ) -> Value {
        if address == 0 {
            return Value::FALSE;
        }
        let alien = self.allocate(
            HeapObject::Alien(Alien::new(None, address as isize)),
            roots,
        );
        self.update_address(alien);
        alien.into()
    }

    /// Marks every absolute alien as expired, they point into a native
    /// address space that no longer exists. Returns how many were expired.
    pub fn expire_external_addresses(&mut self) -> usize {
        let mut expired = 0;
        for (_, object) in self.objects_mut() {
            if let HeapObject::Alien(alien) = object
                && alien.owner().is_none()
                && !alien.is_expired()
            {
                alien.expire();
                expired += 1;
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{HeapCreateInfo, ObjectType};

    fn heap(stress: bool) -> Heap {
        Heap::new(HeapCreateInfo {
            stress,
            ..Default::default()
        })
    }

    fn alien(heap: &Heap, value: Value) -> Alien {
        heap.alien(value).expect("expected an alien").clone()
    }

    #[test]
    fn derive_from_buffer_points_into_its_data() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let buffer = heap.allocate_bytearray(&[0; 16], &mut roots);
        roots.push(buffer);

        let derived = heap.derive(buffer, 4, &mut roots).unwrap();
        let a = alien(&heap, derived);
        assert_eq!(a.owner(), buffer.as_object());
        assert_eq!(a.displacement(), 4);
        assert!(!a.is_expired());

        let data = heap.bytearray(buffer).unwrap().data_ptr();
        assert_eq!(heap.resolve(derived).unwrap(), data.wrapping_add(4));
    }

    #[test]
    fn derived_address_follows_its_owner_across_collections() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let buffer = heap.allocate_bytearray(&[0; 16], &mut roots);
        roots.push(buffer);
        let derived = heap.derive(buffer, 8, &mut roots).unwrap();
        roots.push(derived);

        let before = heap.resolve(derived).unwrap();
        heap.collect(&mut roots);
        let data = heap.bytearray(buffer).unwrap().data_ptr();

        assert_eq!(alien(&heap, derived).address(), data as usize + 8);
        assert_eq!(heap.resolve(derived).unwrap(), data.wrapping_add(8));
        assert_ne!(heap.resolve(derived).unwrap(), before);
    }

    #[test]
    fn derived_alien_keeps_unrooted_owner_alive() {
        let mut heap = heap(true);
        let mut roots: Vec<Value> = Vec::new();
        let buffer = heap.allocate_bytearray(&[1, 2, 3, 4], &mut roots);
        let derived = heap.derive(buffer, 1, &mut roots).unwrap();
        roots.push(derived);

        heap.collect(&mut roots);
        assert_eq!(heap.object_type(buffer), Some(ObjectType::ByteArray));
        let ptr = heap.resolve(derived).unwrap();
        assert_eq!(unsafe { ptr.read() }, 2);
    }

    #[test]
    fn zero_displacement_returns_delegate_without_allocating() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        assert_eq!(heap.derive(Value::FALSE, 0, &mut roots), Ok(Value::FALSE));
        assert_eq!(heap.live_objects(), 0);

        let absolute = heap.derive_absolute(0x1000, &mut roots);
        roots.push(absolute);
        let live = heap.live_objects();
        assert_eq!(heap.derive(absolute, 0, &mut roots), Ok(absolute));
        assert_eq!(heap.live_objects(), live);
    }

    #[test]
    fn zero_displacement_on_buffer_still_wraps_it() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let buffer = heap.allocate_bytearray(&[0; 4], &mut roots);
        roots.push(buffer);
        let derived = heap.derive(buffer, 0, &mut roots).unwrap();
        assert_ne!(derived, buffer);
        assert_eq!(alien(&heap, derived).owner(), buffer.as_object());
    }

    #[test]
    fn derive_absolute_has_no_owner() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let absolute = heap.derive_absolute(0xdead_0000, &mut roots);
        let a = alien(&heap, absolute);
        assert_eq!(a.owner(), None);
        assert_eq!(a.address(), 0xdead_0000);
        assert_eq!(heap.resolve(absolute).unwrap() as usize, 0xdead_0000);
        assert_eq!(heap.resolve_pinned(absolute).unwrap() as usize, 0xdead_0000);
    }

    #[test]
    fn derive_absolute_of_null_is_f() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        assert_eq!(heap.derive_absolute(0, &mut roots), Value::FALSE);
    }

    #[test]
    fn deriving_from_absolute_alien_collapses_into_a_new_absolute_alien() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let a = heap.derive_absolute(0x4000, &mut roots);
        roots.push(a);
        let b = heap.derive(a, 8, &mut roots).unwrap();

        let b = alien(&heap, b);
        assert_eq!(b.owner(), None);
        assert_eq!(b.displacement(), 0x4008);
        assert_eq!(b.address(), 0x4008);
    }

    #[test]
    fn derive_rejects_non_address_values() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let float = heap.box_float(2.0, &mut roots);
        for value in [Value::from_fixnum(3), Value::TRUE, float] {
            assert_eq!(
                heap.derive(value, 4, &mut roots),
                Err(RuntimeError::TypeMismatch {
                    expected: "foreign-address-like",
                    got: value
                })
            );
        }
    }

    #[test]
    fn resolve_of_f_is_null() {
        let mut heap = heap(false);
        assert!(heap.resolve(Value::FALSE).unwrap().is_null());
        assert!(heap.resolve_pinned(Value::FALSE).unwrap().is_null());
    }

    #[test]
    fn resolve_pinned_rejects_buffers_and_derived_aliens() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let buffer = heap.allocate_bytearray(&[0; 8], &mut roots);
        roots.push(buffer);
        let derived = heap.derive(buffer, 0, &mut roots).unwrap();

        assert!(matches!(
            heap.resolve_pinned(buffer),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            heap.resolve_pinned(derived),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert!(heap.resolve(buffer).is_ok());
        assert!(heap.resolve(derived).is_ok());
    }

    #[test]
    fn expiry_only_gates_pinning() {
        let mut heap = heap(false);
        let mut roots: Vec<Value> = Vec::new();
        let buffer = heap.allocate_bytearray(&[0; 8], &mut roots);
        roots.push(buffer);
        let derived = heap.derive(buffer, 2, &mut roots).unwrap();
        roots.push(derived);
        let absolute = heap.derive_absolute(0x7000, &mut roots);
        roots.push(absolute);

        assert_eq!(heap.expire_external_addresses(), 1);
        assert_eq!(heap.expire_external_addresses(), 0, "expiry is one-way");
        assert!(alien(&heap, absolute).is_expired());
        assert!(!alien(&heap, derived).is_expired());

        assert_eq!(
            heap.resolve_pinned(absolute),
            Err(RuntimeError::ExpiredResource { value: absolute })
        );
        assert_eq!(heap.resolve(absolute).unwrap() as usize, 0x7000);
    }

    proptest! {
        #[test]
        fn chains_never_grow_past_one_level(
            d1 in -64isize..64,
            d2 in -64isize..64,
        ) {
            prop_assume!(d1 != 0 && d2 != 0);
            let mut heap = heap(true);
            let mut roots: Vec<Value> = Vec::new();
            let buffer = heap.allocate_bytearray(&[0; 8], &mut roots);
            roots.push(buffer);

            let first = heap.derive(buffer, d1, &mut roots).unwrap();
            roots.push(first);
            let second = heap.derive(first, d2, &mut roots).unwrap();

            let second = alien(&heap, second);
            prop_assert_eq!(second.owner(), buffer.as_object());
            prop_assert_eq!(second.displacement(), d1 + d2);
        }

        #[test]
        fn pinning_any_derived_alien_fails(displacement in any::<isize>()) {
            let mut heap = heap(false);
            let mut roots: Vec<Value> = Vec::new();
            let buffer = heap.allocate_bytearray(&[0; 8], &mut roots);
            roots.push(buffer);
            let derived = heap.derive(buffer, displacement, &mut roots).unwrap();
            let is_type_mismatch = matches!(
                heap.resolve_pinned(derived),
                Err(RuntimeError::TypeMismatch { .. })
            );
            prop_assert!(is_type_mismatch);
        }
    }
}
