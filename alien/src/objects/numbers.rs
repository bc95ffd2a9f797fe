/// Boxed float, every float the VM sees lives in the heap.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Float {
    pub value: f64,
}

/// Integer that does not fit a fixnum. Wide enough for any 64-bit
/// signed or unsigned value read from foreign memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BigNum {
    pub value: i128,
}
