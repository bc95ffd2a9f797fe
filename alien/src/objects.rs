use std::mem;

pub mod aliens;
pub mod bytearrays;
pub mod dlls;
pub mod numbers;

use crate::{Alien, BigNum, ByteArray, Dll, Float, Visitable, Visitor};

#[rustfmt::skip]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectType {
    ByteArray   = 0b00011,
    Float       = 0b01001,
    BigNum      = 0b01010,
    Alien       = 0b01011,
    Dll         = 0b01100,
}

impl ObjectType {
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::ByteArray => "byte-array",
            ObjectType::Float => "float",
            ObjectType::BigNum => "bignum",
            ObjectType::Alien => "alien",
            ObjectType::Dll => "dll",
        }
    }
}

/// Every object that can live in the heap's object table.
#[derive(Debug)]
pub enum HeapObject {
    ByteArray(ByteArray),
    Float(Float),
    BigNum(BigNum),
    Alien(Alien),
    Dll(Dll),
}

impl HeapObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            HeapObject::ByteArray(_) => ObjectType::ByteArray,
            HeapObject::Float(_) => ObjectType::Float,
            HeapObject::BigNum(_) => ObjectType::BigNum,
            HeapObject::Alien(_) => ObjectType::Alien,
            HeapObject::Dll(_) => ObjectType::Dll,
        }
    }

    /// bytes this object accounts for when deciding to collect
    pub fn heap_size(&self) -> usize {
        let data = match self {
            HeapObject::ByteArray(bytes) => bytes.size(),
            _ => 0,
        };
        mem::size_of::<Self>() + data
    }
}

impl Visitable for HeapObject {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        match self {
            HeapObject::Alien(alien) => alien.visit_edges(visitor),
            HeapObject::Dll(dll) => dll.visit_edges(visitor),
            HeapObject::ByteArray(_) | HeapObject::Float(_) | HeapObject::BigNum(_) => (),
        }
    }
}
