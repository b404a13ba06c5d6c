//! Translation of a table index into physical device addresses.
//!
//! Every function in here is pure: it only depends on the [`Layout`] constants. Range checking
//! of the index is left to the caller, results for `index >= max_users()` are meaningless.
//!
//! Both storage forms share the same arithmetic. The internal EEPROM is a single page spanning
//! the whole device, the paged device hands out successive indices to successive pages so that
//! writes are spread over the whole chip:
//!
//! ```text
//! page(index) = index % pages
//! slot(index) = index / pages
//! ```

use crate::error::Error;

/// The user count field sits three bytes before the end of its page (or of the device).
pub(crate) const COUNT_FIELD_GAP: u32 = 3;
pub(crate) const COUNT_FIELD_SIZE: u32 = 2;

const BITS_PER_BYTE: u32 = u8::BITS;

/// The storage form a [`Layout`] describes. It also decides how authorization flags are stored.
#[derive(strum::Display, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutKind {
    /// Small byte addressable memory, authorization flags are packed eight per byte.
    Internal,
    /// External memory organized in pages, one authorization byte per slot.
    Paged,
}

/// Where the authorization flag of a single user lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthLocation {
    Bit { address: u32, bit: u8 },
    Byte { address: u32 },
}

impl AuthLocation {
    pub const fn address(&self) -> u32 {
        match *self {
            AuthLocation::Bit { address, .. } | AuthLocation::Byte { address } => address,
        }
    }
}

/// Physical layout of the access table.
///
/// Within each page the regions are laid out as:
///
/// ```text
/// [ tag slots: users_per_page * tag_len ][ auth region ] .. [ count: u16 le ][ 1 spare byte ]
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    kind: LayoutKind,
    device_size: u32,
    page_size: u32,
    pages: u16,
    users_per_page: u16,
    tag_len: u8,
    auth_offset: u32,
    count_offset: u32,
}

impl Layout {
    /// Built-in EEPROM of an ATmega328P: 1 KiB, 247 users with 4 byte tags.
    pub const ARDUINO_EEPROM: Layout = Layout::internal_unchecked(1024, 247, 4);

    /// Microchip 25LC1024: 1 Mbit in 512 pages of 256 bytes, 32 users with 4 byte tags per page.
    pub const SPI_25LC1024: Layout = Layout::paged_unchecked(128 * 1024, 256, 32, 4);

    /// Layout for byte addressable memory. All regions live in one flat address space:
    /// tags from address 0, the packed authorization bits right after them and the count field
    /// at `device_size - 3`.
    pub const fn internal(device_size: u32, max_users: u16, tag_len: u8) -> Result<Layout, Error> {
        if device_size < COUNT_FIELD_GAP {
            return Err(Error::InvalidDeviceSize);
        }
        let layout = Self::internal_unchecked(device_size, max_users, tag_len);
        match layout.validate() {
            Ok(()) => Ok(layout),
            Err(e) => Err(e),
        }
    }

    /// Layout for a paged device. Every page holds `users_per_page` tag slots, one
    /// authorization byte per slot and its own count field at `page_size - 3`.
    pub const fn paged(
        device_size: u32,
        page_size: u32,
        users_per_page: u16,
        tag_len: u8,
    ) -> Result<Layout, Error> {
        if page_size < COUNT_FIELD_GAP {
            return Err(Error::InvalidPageSize);
        }
        if device_size == 0 || !device_size.is_multiple_of(page_size) {
            return Err(Error::InvalidDeviceSize);
        }
        if device_size / page_size > u16::MAX as u32 {
            return Err(Error::InvalidDeviceSize);
        }
        let layout = Self::paged_unchecked(device_size, page_size, users_per_page, tag_len);
        match layout.validate() {
            Ok(()) => Ok(layout),
            Err(e) => Err(e),
        }
    }

    const fn internal_unchecked(device_size: u32, max_users: u16, tag_len: u8) -> Layout {
        Layout {
            kind: LayoutKind::Internal,
            device_size,
            page_size: device_size,
            pages: 1,
            users_per_page: max_users,
            tag_len,
            auth_offset: max_users as u32 * tag_len as u32,
            count_offset: device_size - COUNT_FIELD_GAP,
        }
    }

    const fn paged_unchecked(
        device_size: u32,
        page_size: u32,
        users_per_page: u16,
        tag_len: u8,
    ) -> Layout {
        Layout {
            kind: LayoutKind::Paged,
            device_size,
            page_size,
            pages: (device_size / page_size) as u16,
            users_per_page,
            tag_len,
            auth_offset: users_per_page as u32 * tag_len as u32,
            count_offset: page_size - COUNT_FIELD_GAP,
        }
    }

    const fn validate(&self) -> Result<(), Error> {
        if self.tag_len == 0 || self.tag_len as usize > crate::MAX_TAG_LENGTH {
            return Err(Error::InvalidGeometry);
        }
        if self.users_per_page == 0 || self.pages == 0 {
            return Err(Error::InvalidGeometry);
        }
        if self.pages as u32 * self.users_per_page as u32 > u16::MAX as u32 {
            return Err(Error::InvalidGeometry);
        }
        // the tag and auth regions must end before the count field
        if self.auth_offset + self.auth_region_len() > self.count_offset {
            return Err(Error::InvalidGeometry);
        }
        if self.count_offset + COUNT_FIELD_SIZE > self.page_size {
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }

    const fn auth_region_len(&self) -> u32 {
        match self.kind {
            LayoutKind::Internal => (self.users_per_page as u32).div_ceil(BITS_PER_BYTE),
            LayoutKind::Paged => self.users_per_page as u32,
        }
    }

    pub const fn kind(&self) -> LayoutKind {
        self.kind
    }

    pub const fn device_size(&self) -> u32 {
        self.device_size
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    pub const fn pages(&self) -> u16 {
        self.pages
    }

    pub const fn users_per_page(&self) -> u16 {
        self.users_per_page
    }

    pub const fn tag_len(&self) -> u8 {
        self.tag_len
    }

    /// Capacity of the whole table.
    pub const fn max_users(&self) -> u16 {
        // validated to fit
        self.pages * self.users_per_page
    }

    pub const fn page_number(&self, index: u16) -> u16 {
        index % self.pages
    }

    /// Position of the user within its page.
    pub const fn slot(&self, index: u16) -> u16 {
        index / self.pages
    }

    pub const fn page_base(&self, page: u16) -> u32 {
        page as u32 * self.page_size
    }

    pub const fn page_address(&self, index: u16) -> u32 {
        self.page_base(self.page_number(index))
    }

    /// Offset of the tag relative to its page.
    pub const fn tag_offset(&self, index: u16) -> u32 {
        self.slot(index) as u32 * self.tag_len as u32
    }

    pub const fn tag_address(&self, index: u16) -> u32 {
        self.page_address(index) + self.tag_offset(index)
    }

    /// Offset of the byte holding the authorization flag, relative to its page.
    pub const fn auth_offset(&self, index: u16) -> u32 {
        let slot = self.slot(index) as u32;
        match self.kind {
            LayoutKind::Internal => self.auth_offset + slot / BITS_PER_BYTE,
            LayoutKind::Paged => self.auth_offset + slot,
        }
    }

    pub const fn auth_location(&self, index: u16) -> AuthLocation {
        match self.kind {
            LayoutKind::Internal => {
                let (address, bit) = self.auth_bit(index);
                AuthLocation::Bit { address, bit }
            }
            LayoutKind::Paged => AuthLocation::Byte {
                address: self.page_address(index) + self.auth_offset(index),
            },
        }
    }

    /// Address and bit of a bit-packed flag. Only meaningful for [`LayoutKind::Internal`].
    pub const fn auth_bit(&self, index: u16) -> (u32, u8) {
        (
            self.page_address(index) + self.auth_offset(index),
            (self.slot(index) as u32 % BITS_PER_BYTE) as u8,
        )
    }

    /// Offset of the user count field relative to every page.
    pub const fn count_offset(&self) -> u32 {
        self.count_offset
    }

    pub const fn count_address(&self, page: u16) -> u32 {
        self.page_base(page) + self.count_offset
    }
}

const _: () = assert!(
    matches!(Layout::ARDUINO_EEPROM.validate(), Ok(())),
    "internal EEPROM preset must be consistent"
);
const _: () = assert!(
    matches!(Layout::SPI_25LC1024.validate(), Ok(())),
    "SPI EEPROM preset must be consistent"
);
