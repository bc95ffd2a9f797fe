//! Typed reads and writes at an address plus a byte offset.
//!
//! There is no bounds checking: foreign memory carries no length, and the
//! caller answers for every address it hands in. Integer writes truncate to
//! the target width like a C cast.

use std::mem::size_of;

use crate::{
    ExecutionResult, Heap, PrimitiveContext, PrimitiveMessage, RootProvider,
    RuntimeError, Value,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Encoding {
    Signed,
    Unsigned,
    Float,
    Pointer,
}

/// A native value with a boxed counterpart in the VM.
pub trait Scalar: Copy {
    const ENCODING: Encoding;

    fn from_value(heap: &Heap, value: Value) -> Result<Self, RuntimeError>;

    /// May allocate.
    fn into_value(self, heap: &mut Heap, roots: &mut dyn RootProvider) -> Value;
}

macro_rules! integer_scalar {
    ($($ty:ty => $encoding:ident),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const ENCODING: Encoding = Encoding::$encoding;

                #[inline]
                fn from_value(heap: &Heap, value: Value) -> Result<Self, RuntimeError> {
                    heap.integer_value(value)
                        .map(|integer| integer as $ty)
                        .ok_or(RuntimeError::type_mismatch("integer", value))
                }

                #[inline]
                fn into_value(self, heap: &mut Heap, roots: &mut dyn RootProvider) -> Value {
                    heap.box_integer(self as i128, roots)
                }
            }
        )*
    };
}

integer_scalar! {
    i8 => Signed,
    u8 => Unsigned,
    i16 => Signed,
    u16 => Unsigned,
    i32 => Signed,
    u32 => Unsigned,
    i64 => Signed,
    u64 => Unsigned,
    isize => Signed,
    usize => Unsigned,
}

impl Scalar for f32 {
    const ENCODING: Encoding = Encoding::Float;

    fn from_value(heap: &Heap, value: Value) -> Result<Self, RuntimeError> {
        heap.float_value(value)
            .map(|float| float as f32)
            .ok_or(RuntimeError::type_mismatch("float", value))
    }

    fn into_value(self, heap: &mut Heap, roots: &mut dyn RootProvider) -> Value {
        heap.box_float(self as f64, roots)
    }
}

impl Scalar for f64 {
    const ENCODING: Encoding = Encoding::Float;

    fn from_value(heap: &Heap, value: Value) -> Result<Self, RuntimeError> {
        heap.float_value(value)
            .ok_or(RuntimeError::type_mismatch("float", value))
    }

    fn into_value(self, heap: &mut Heap, roots: &mut dyn RootProvider) -> Value {
        heap.box_float(self, roots)
    }
}

/// A native pointer stored in memory. Reads come back as absolute aliens
/// (`f` for null), writes need an address that is stable to store.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CellPointer(pub *mut u8);

impl Scalar for CellPointer {
    const ENCODING: Encoding = Encoding::Pointer;

    fn from_value(heap: &Heap, value: Value) -> Result<Self, RuntimeError> {
        heap.resolve_pinned(value).map(CellPointer)
    }

    fn into_value(self, heap: &mut Heap, roots: &mut dyn RootProvider) -> Value {
        heap.derive_absolute(self.0 as usize, roots)
    }
}

pub fn offset_value(heap: &Heap, offset: Value) -> Result<isize, RuntimeError> {
    heap.integer_value(offset)
        .map(|offset| offset as isize)
        .ok_or(RuntimeError::type_mismatch("integer", offset))
}

// `f` resolves to null, so `f` plus an offset is a plain integer address
#[inline]
fn effective_address(base: *mut u8, offset: isize) -> usize {
    (base as usize).wrapping_add_signed(offset)
}

/// Reads a `T` at `address + offset`. The address is resolved on every call.
pub fn read_scalar<T: Scalar>(
    heap: &mut Heap,
    address: Value,
    offset: isize,
    roots: &mut dyn RootProvider,
) -> Result<Value, RuntimeError> {
    let ptr = effective_address(heap.resolve(address)?, offset) as *const T;
    // SAFETY: none, foreign memory is the caller's responsibility
    let raw = unsafe { ptr.read_unaligned() };
    // boxing may collect, the pointer is dead by now
    Ok(raw.into_value(heap, roots))
}

/// Stores `value` as a `T` at `address + offset`.
pub fn write_scalar<T: Scalar>(
    heap: &mut Heap,
    address: Value,
    offset: isize,
    value: Value,
) -> Result<(), RuntimeError> {
    let ptr = effective_address(heap.resolve(address)?, offset) as *mut T;
    let raw = T::from_value(heap, value)?;
    // SAFETY: none, foreign memory is the caller's responsibility
    unsafe { ptr.write_unaligned(raw) };
    Ok(())
}

// ( alien offset -- value )
fn read_primitive<T: Scalar>(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let offset = ctx.state.pop()?;
    let address = ctx.state.pop()?;
    let offset = offset_value(&ctx.vm.heap, offset)?;
    let value = read_scalar::<T>(&mut ctx.vm.heap, address, offset, ctx.state)?;
    ctx.state.push(value)
}

// ( value alien offset -- )
fn write_primitive<T: Scalar>(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let offset = ctx.state.pop()?;
    let address = ctx.state.pop()?;
    let value = ctx.state.pop()?;
    let offset = offset_value(&ctx.vm.heap, offset)?;
    write_scalar::<T>(&mut ctx.vm.heap, address, offset, value)
}

macro_rules! alien_accessors {
    (
        $(
            $kind:ident ( $ty:ty ) => $name:literal, $reader:ident, $writer:ident
        );* $(;)?
    ) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub enum AccessorKind {
            $($kind),*
        }

        impl AccessorKind {
            pub const ALL: &'static [AccessorKind] = &[$(AccessorKind::$kind),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(AccessorKind::$kind => $name),*
                }
            }

            pub fn width(self) -> usize {
                match self {
                    $(AccessorKind::$kind => size_of::<$ty>()),*
                }
            }

            pub fn encoding(self) -> Encoding {
                match self {
                    $(AccessorKind::$kind => <$ty as Scalar>::ENCODING),*
                }
            }
        }

        $(
            pub fn $reader(ctx: &mut PrimitiveContext) -> ExecutionResult {
                read_primitive::<$ty>(ctx)
            }

            pub fn $writer(ctx: &mut PrimitiveContext) -> ExecutionResult {
                write_primitive::<$ty>(ctx)
            }
        )*

        pub const ACCESSOR_PRIMITIVES: &[PrimitiveMessage<'static>] = &[
            $(
                PrimitiveMessage::new(concat!("alien-", $name), 2, 1, $reader),
                PrimitiveMessage::new(concat!("set-alien-", $name), 3, 0, $writer),
            )*
        ];
    };
}

alien_accessors! {
    Signed1(i8) => "signed-1", alien_signed_1, set_alien_signed_1;
    Unsigned1(u8) => "unsigned-1", alien_unsigned_1, set_alien_unsigned_1;
    Signed2(i16) => "signed-2", alien_signed_2, set_alien_signed_2;
    Unsigned2(u16) => "unsigned-2", alien_unsigned_2, set_alien_unsigned_2;
    Signed4(i32) => "signed-4", alien_signed_4, set_alien_signed_4;
    Unsigned4(u32) => "unsigned-4", alien_unsigned_4, set_alien_unsigned_4;
    Signed8(i64) => "signed-8", alien_signed_8, set_alien_signed_8;
    Unsigned8(u64) => "unsigned-8", alien_unsigned_8, set_alien_unsigned_8;
    SignedCell(isize) => "signed-cell", alien_signed_cell, set_alien_signed_cell;
    UnsignedCell(usize) => "unsigned-cell", alien_unsigned_cell, set_alien_unsigned_cell;
    Float(f32) => "float", alien_float, set_alien_float;
    Double(f64) => "double", alien_double, set_alien_double;
    Cell(CellPointer) => "cell", alien_cell, set_alien_cell;
}
