use crate::backend::{Backend, DuplicatePolicy};
use crate::error::Error;
use crate::layout::{Layout, LayoutKind};
use crate::platform::{ByteOps, Platform};
use crate::raw::{self, CountField};
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Table in small, byte addressable memory such as the built-in EEPROM of a microcontroller.
///
/// Every access goes straight to the device, single flags are updated by flipping their bit in
/// place. Duplicate tags are rejected by default.
pub struct InternalBackend<T: Platform> {
    pub(crate) hal: T,
    pub(crate) layout: Layout,
}

impl<T: Platform> InternalBackend<T> {
    pub fn new(hal: T, layout: Layout) -> Result<Self, Error> {
        if layout.kind() != LayoutKind::Internal {
            return Err(Error::CapacityMismatch);
        }
        if hal.capacity() < layout.device_size() as usize {
            return Err(Error::CapacityMismatch);
        }

        Ok(Self { hal, layout })
    }

    fn load_count(&mut self) -> Result<CountField, Error> {
        let mut bytes = [0u8; 2];
        self.hal
            .read(self.layout.count_address(0), &mut bytes)
            .map_err(|_| Error::DeviceError)?;
        Ok(CountField::from_bytes(bytes))
    }

    fn store_count(&mut self, count: u16) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("store_count: {}", count);

        if count > self.layout.max_users() {
            return Err(Error::CountOutOfRange(count));
        }
        self.hal
            .write(
                self.layout.count_address(0),
                &CountField::from_count(count).to_bytes(),
            )
            .map_err(|_| Error::DeviceError)
    }

    fn read_flag(&mut self, index: u16) -> Result<bool, Error> {
        let (address, bit) = self.layout.auth_bit(index);
        let byte = self
            .hal
            .read_byte(address)
            .map_err(|_| Error::DeviceError)?;
        Ok(raw::packed_flag(byte, bit))
    }

    /// Read-modify-write of the byte holding the flag, skipped if the flag is already set.
    fn write_flag(&mut self, index: u16, auth: bool) -> Result<(), Error> {
        let (address, bit) = self.layout.auth_bit(index);
        let byte = self
            .hal
            .read_byte(address)
            .map_err(|_| Error::DeviceError)?;
        if raw::packed_flag(byte, bit) == auth {
            return Ok(());
        }
        let updated = raw::toggle_packed_flag(byte, bit);

        #[cfg(feature = "defmt")]
        trace!("write_flag @{:#06x}: {:#04x} -> {:#04x}", address, byte, updated);

        self.hal
            .write_byte(address, updated)
            .map_err(|_| Error::DeviceError)
    }
}

impl<T: Platform> Backend for InternalBackend<T> {
    type Device = T;

    const DEFAULT_DUPLICATE_POLICY: DuplicatePolicy = DuplicatePolicy::Reject;

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn device(&self) -> &T {
        &self.hal
    }

    fn device_mut(&mut self) -> &mut T {
        &mut self.hal
    }

    fn into_device(self) -> T {
        self.hal
    }

    fn user_count(&mut self) -> Result<u16, Error> {
        let count = self.load_count()?.to_count();
        if count > self.layout.max_users() {
            #[cfg(feature = "defmt")]
            warn!(
                "user count {} exceeds capacity {}, clamping",
                count,
                self.layout.max_users()
            );
            return Ok(self.layout.max_users());
        }
        Ok(count)
    }

    fn read_tag(&mut self, index: u16, tag: &mut [u8]) -> Result<(), Error> {
        self.hal
            .read(self.layout.tag_address(index), tag)
            .map_err(|_| Error::DeviceError)
    }

    fn read_auth(&mut self, index: u16) -> Result<bool, Error> {
        self.read_flag(index)
    }

    fn write_auth(&mut self, index: u16, auth: bool) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("write_auth: #{} = {}", index, auth);

        self.write_flag(index, auth)
    }

    fn append(&mut self, index: u16, tag: &[u8], auth: bool) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("append: #{} @{:#06x}", index, self.layout.tag_address(index));

        self.hal
            .write(self.layout.tag_address(index), tag)
            .map_err(|_| Error::DeviceError)?;
        self.write_flag(index, auth)?;

        // the record only becomes visible once the count covers it
        self.store_count(index + 1)
    }

    fn clear(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("clear");

        self.hal.erase_all().map_err(|_| Error::DeviceError)
    }

    fn count_bytes(&mut self) -> Result<[u8; 2], Error> {
        Ok(self.load_count()?.to_bytes())
    }
}
