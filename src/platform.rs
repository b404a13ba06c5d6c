use alloc::vec;
use embedded_storage::Storage;

/// Storage driver the table is persisted on. Reads and writes of single bytes or byte ranges
/// come from [`embedded_storage::ReadStorage`] and [`embedded_storage::Storage`].
///
/// See README.md for an example implementation.
pub trait Platform: Storage {
    /// Size of a physical write page. Byte writable memory uses 1.
    const PAGE_SIZE: usize;

    /// Erases the whole device.
    ///
    /// The default fills the device with zeros through [`Storage::write`], one page per write.
    /// Devices that have a chip erase command should use it instead, erased cells then read as
    /// `0xFF`.
    fn erase_all(&mut self) -> Result<(), Self::Error> {
        let capacity = self.capacity();
        let chunk = Self::PAGE_SIZE.max(1);
        let zeros = vec![0u8; chunk];
        let mut offset = 0;
        while offset < capacity {
            let len = chunk.min(capacity - offset);
            self.write(offset as u32, &zeros[..len])?;
            self.wait_write_cycle();
            offset += len;
        }
        Ok(())
    }

    /// Sets the block write protection of the device. Devices without one ignore the request.
    fn set_write_protection(&mut self, _mode: WriteProtection) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Blocks until a page write has been committed by the device.
    fn wait_write_cycle(&mut self) {}
}

/// Block protection as encoded by the BP1:BP0 bits of the status register of common SPI
/// EEPROMs.
#[derive(strum::FromRepr, strum::Display, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WriteProtection {
    #[default]
    None = 0b00,
    UpperQuarter = 0b01,
    UpperHalf = 0b10,
    All = 0b11,
}

const STATUS_BP_SHIFT: u8 = 2;
const STATUS_BP_MASK: u8 = 0b11;

impl WriteProtection {
    /// The protection bits positioned within the status register.
    pub const fn status_bits(self) -> u8 {
        (self as u8) << STATUS_BP_SHIFT
    }

    pub fn from_status(status: u8) -> Self {
        // both bits are covered by the enum
        Self::from_repr((status >> STATUS_BP_SHIFT) & STATUS_BP_MASK).unwrap_or_default()
    }

    /// First protected address for a device of `capacity` bytes.
    pub const fn protected_from(self, capacity: u32) -> u32 {
        match self {
            WriteProtection::None => capacity,
            WriteProtection::UpperQuarter => capacity - capacity / 4,
            WriteProtection::UpperHalf => capacity / 2,
            WriteProtection::All => 0,
        }
    }
}

/// Byte granular helpers on top of the range based driver operations.
pub trait ByteOps: Platform {
    fn read_byte(&mut self, address: u32) -> Result<u8, Self::Error> {
        let mut byte = [0u8];
        self.read(address, &mut byte)?;
        Ok(byte[0])
    }

    fn write_byte(&mut self, address: u32, value: u8) -> Result<(), Self::Error> {
        self.write(address, &[value])
    }

    /// Writes one or more whole pages and waits for the write cycle to finish.
    fn write_page(&mut self, address: u32, page: &[u8]) -> Result<(), Self::Error> {
        debug_assert!((address as usize).is_multiple_of(Self::PAGE_SIZE));
        debug_assert!(page.len().is_multiple_of(Self::PAGE_SIZE));
        self.write(address, page)?;
        self.wait_write_cycle();
        Ok(())
    }
}

impl<T: Platform> ByteOps for T {}
