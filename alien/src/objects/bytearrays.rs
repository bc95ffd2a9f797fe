/// Managed byte buffer. The storage is owned by the heap and gets moved
/// by the collector, so `data_ptr` is only valid until the next allocation.
#[derive(Debug)]
pub struct ByteArray {
    data: Box<[u8]>,
}

impl ByteArray {
    pub fn new(data: &[u8]) -> Self {
        Self { data: data.into() }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// start of the payload at the current location
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr().cast_mut()
    }

    /// The bytes up to the first NUL, the way C strings stored in byte arrays are read.
    pub fn c_bytes(&self) -> &[u8] {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        &self.data[..end]
    }

    /// Moves the payload to fresh storage. Returns the number of bytes moved.
    pub(crate) fn relocate(&mut self) -> usize {
        let moved: Box<[u8]> = self.data.as_ref().into();
        // the old storage is alive during the copy, so a non-empty payload always lands elsewhere
        self.data = moved;
        self.data.len()
    }
}
