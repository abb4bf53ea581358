use crate::shared_memory::SharedMemory;
use serde::{Deserialize, Serialize};

/// One entry of the bus's ordered region table.
#[derive(Serialize, Deserialize)]
pub struct MemoryRegion {
    base: u16,
    writable: bool,
    data: SharedMemory,
}

impl MemoryRegion {
    #[must_use]
    pub fn new(base: u16, len: usize, writable: bool) -> Self {
        Self {
            base,
            writable,
            data: SharedMemory::new(len, 0),
        }
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> u16 {
        self.base
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: u16) -> bool {
        addr >= self.base && (addr as usize) < self.base as usize + self.data.len()
    }

    /// Reads the byte at an absolute address. The caller guarantees
    /// `contains(addr)`.
    #[inline]
    #[must_use]
    pub fn get(&self, addr: u16) -> u8 {
        self.data.get((addr - self.base) as usize)
    }

    /// Writes the byte at an absolute address, writable regions only.
    /// The caller guarantees `contains(addr)`.
    #[inline]
    pub fn set(&self, addr: u16, data: u8) {
        debug_assert!(self.writable);
        self.data.set((addr - self.base) as usize, data);
    }

    pub fn fill(&self, v: u8) {
        self.data.fill(v);
    }

    /// Copies an image into the region starting at region offset 0,
    /// regardless of write protection. ROM contents are established this
    /// way once, before reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the image does not fit the region.
    pub fn load(&self, image: &[u8]) -> Result<(), &'static str> {
        if image.len() > self.data.len() {
            return Err("Image larger than region.");
        }
        self.data.copy(0, image);
        Ok(())
    }
}
