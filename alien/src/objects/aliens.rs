use crate::{ObjectRef, Value, Visitable, Visitor};

/// A foreign address.
///
/// Either absolute (`owner` absent, `displacement` is the address itself) or
/// derived from a managed byte array plus a displacement. The owner is never
/// another alien, derivation collapses chains so recomputing is a single lookup.
#[derive(Debug, Clone)]
pub struct Alien {
    owner: Option<ObjectRef>,
    displacement: isize,
    address: usize,
    expired: bool,
}

impl Alien {
    pub(crate) fn new(owner: Option<ObjectRef>, displacement: isize) -> Self {
        Self {
            owner,
            displacement,
            address: displacement as usize,
            expired: false,
        }
    }

    #[inline]
    pub fn owner(&self) -> Option<ObjectRef> {
        self.owner
    }

    #[inline]
    pub fn displacement(&self) -> isize {
        self.displacement
    }

    /// Cached absolute address, only trustworthy right after
    /// [`Heap::update_address`](crate::Heap::update_address).
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    #[inline]
    pub(crate) fn set_address(&mut self, owner_data: Option<*mut u8>) {
        self.address = match owner_data {
            Some(data) => data.wrapping_offset(self.displacement) as usize,
            None => self.displacement as usize,
        };
    }

    #[inline]
    pub(crate) fn expire(&mut self) {
        self.expired = true;
    }
}

impl Visitable for Alien {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        if let Some(owner) = self.owner {
            visitor.visit(Value::from_ref(owner));
        }
    }
}
