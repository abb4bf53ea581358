use crate::consts::*;
use crate::region::MemoryRegion;
use log::{error, trace};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Address decoder over an ordered table of memory regions.
///
/// The bus is a pure decoder: reads and writes never touch the CPU cycle
/// counter, and both take `&self` so the CPU and the scan-out can share one
/// bus across threads.
#[derive(Serialize, Deserialize)]
pub struct Bus {
    regions: Vec<MemoryRegion>,
}

impl Bus {
    /// Builds the initial region table: RAM, VRAM, ROM.
    #[must_use]
    pub fn new() -> Self {
        Self::with_regions(vec![
            MemoryRegion::new(RAM_ADDR, RAM_SIZE, true),
            MemoryRegion::new(VRAM_ADDR, VRAM_SIZE, true),
            MemoryRegion::new(ROM_ADDR, ROM_SIZE, false),
        ])
    }

    #[must_use]
    pub fn with_regions(regions: Vec<MemoryRegion>) -> Self {
        Self { regions }
    }

    #[inline]
    fn region(&self, addr: u16) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    /// Reads are total: an address outside every region reads as open bus.
    #[inline]
    #[must_use]
    pub fn read(&self, addr: u16) -> u8 {
        match self.region(addr) {
            Some(r) => r.get(addr),
            None => OPEN_BUS,
        }
    }

    /// Writes to read-only or unmapped addresses are dropped.
    #[inline]
    pub fn write(&self, addr: u16, data: u8) {
        match self.region(addr) {
            Some(r) if r.writable() => r.set(addr, data),
            _ => trace!("dropped write 0x{addr:04x} = 0x{data:02x}"),
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Loads a program image into ROM, starting at region offset 0.
    ///
    /// # Errors
    ///
    /// Returns an error if no ROM region exists or the image does not fit.
    pub fn load_rom(&self, image: &[u8]) -> Result<(), &'static str> {
        trace!("Load rom, {} bytes", image.len());
        let Some(rom) = self.region(ROM_ADDR) else {
            error!("No region at 0x{ROM_ADDR:04x}");
            return Err("No ROM region.");
        };
        rom.load(image)
    }

    /// Reads a program image to end-of-stream and loads it into ROM.
    /// Returns the number of bytes loaded.
    ///
    /// # Errors
    ///
    /// I/O errors abort the load; an oversized image is reported as
    /// `InvalidData`.
    pub fn load_rom_from_reader<R: Read>(&self, mut reader: R) -> std::io::Result<usize> {
        let mut image = Vec::new();
        reader.read_to_end(&mut image)?;
        self.load_rom(&image)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(image.len())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode() {
        let bus = Bus::new();
        bus.write(0x0000, 0x11);
        bus.write(0x5FFF, 0x22);
        bus.write(0x6000, 0x33);
        bus.write(0x7FFF, 0x44);
        assert_eq!(bus.read(0x0000), 0x11);
        assert_eq!(bus.read(0x5FFF), 0x22);
        assert_eq!(bus.read(0x6000), 0x33);
        assert_eq!(bus.read(0x7FFF), 0x44);
    }

    #[test]
    fn rom_writes_dropped() {
        let bus = Bus::new();
        bus.load_rom(&[0xA9, 0x42]).unwrap();
        bus.write(0x8000, 0x00);
        bus.write(0xFFFF, 0x77);
        assert_eq!(bus.read(0x8000), 0xA9);
        assert_eq!(bus.read(0xFFFF), 0x00);
    }

    #[test]
    fn reads_are_total() {
        let bus = Bus::new();
        for addr in [0x0000u16, 0x2fff, 0x6000, 0x7abc, 0x8000, 0xFFFF] {
            let _ = bus.read(addr);
        }
        // A sparse table still reads everywhere, as open bus.
        let sparse = Bus::with_regions(vec![MemoryRegion::new(0x0000, 0x100, true)]);
        assert_eq!(sparse.read(0x4000), OPEN_BUS);
        sparse.write(0x4000, 0x55); // dropped
        assert_eq!(sparse.read(0x4000), OPEN_BUS);
    }

    #[test]
    fn write_then_read() {
        let bus = Bus::new();
        for addr in [0x0000u16, 0x1234, 0x5FFF, 0x6000, 0x7FFF] {
            bus.write(addr, 0xA5);
            assert_eq!(bus.read(addr), 0xA5);
        }
    }

    #[test]
    fn rom_image_too_large() {
        let bus = Bus::new();
        assert!(bus.load_rom(&vec![0; ROM_SIZE + 1]).is_err());
        assert!(bus.load_rom(&vec![0; ROM_SIZE]).is_ok());
    }

    #[test]
    fn rom_from_reader() {
        let bus = Bus::new();
        let image: &[u8] = &[0x01, 0x02, 0x03];
        assert_eq!(bus.load_rom_from_reader(image).unwrap(), 3);
        assert_eq!(bus.read(0x8002), 0x03);
    }
}
