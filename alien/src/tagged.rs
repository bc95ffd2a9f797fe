//! Value: any raw value, small integer/reference/immediate
//!
//! ObjectRef: index into the heap's object table, stable for the lifetime of the object.
//! The collector may move the *data* behind an object (byte array storage), never the index,
//! so holding an ObjectRef across an allocation is fine as long as the object stays reachable.

#[allow(unused)]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueTag {
    Fixnum = 0b0,
    Reference = 0b01,
    Immediate = 0b11,
}

pub const OBJECT_TAG_MASK: u64 = 0b11;

pub const FIXNUM_MIN: i64 = -(1_i64 << 62);
pub const FIXNUM_MAX: i64 = (1_i64 << 62) - 1;

/// A generic Value
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value(u64);

/// Index of a live object in the heap
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(u32);

impl ObjectRef {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Value {
    /// the "no value" object, also boolean false
    pub const FALSE: Value = Value(ValueTag::Immediate as u64);
    pub const TRUE: Value = Value((1 << 2) | ValueTag::Immediate as u64);

    /// # Panics
    /// in debug builds if `value` is outside of the fixnum range
    pub fn from_fixnum(value: i64) -> Self {
        debug_assert!(
            (FIXNUM_MIN..=FIXNUM_MAX).contains(&value),
            "fixnum out of range: {value}"
        );
        let casted = value.cast_unsigned();
        let tagged = casted << 1;
        Self(tagged)
    }

    pub fn from_bool(value: bool) -> Self {
        if value { Self::TRUE } else { Self::FALSE }
    }

    pub fn from_ref(object: ObjectRef) -> Self {
        Self(((object.0 as u64) << 2) | ValueTag::Reference as u64)
    }

    pub fn zero() -> Self {
        Self::from_fixnum(0)
    }

    pub fn fits_fixnum(value: i128) -> bool {
        (FIXNUM_MIN as i128..=FIXNUM_MAX as i128).contains(&value)
    }

    pub fn is_fixnum(&self) -> bool {
        self.0 & 0b1 == ValueTag::Fixnum as u64
    }

    pub fn is_reference(&self) -> bool {
        self.0 & OBJECT_TAG_MASK == ValueTag::Reference as u64
    }

    pub fn is_immediate(&self) -> bool {
        self.0 & OBJECT_TAG_MASK == ValueTag::Immediate as u64
    }

    /// only `f` is false, everything else counts as true
    pub fn is_false(&self) -> bool {
        *self == Self::FALSE
    }

    pub fn as_fixnum(self) -> Option<i64> {
        if self.is_fixnum() {
            // arithmetic shift restores the sign
            return Some(self.0.cast_signed() >> 1);
        }
        None
    }

    pub fn as_object(self) -> Option<ObjectRef> {
        if self.is_reference() {
            return Some(ObjectRef((self.0 >> 2) as u32));
        }
        None
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::from_ref(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}
