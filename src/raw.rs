//! Encoding of the values persisted on the device.

use core::fmt::{Debug, Formatter};

/// State of a cell that has been erased but never written.
pub(crate) const ERASED: u8 = 0xFF;

/// Raw little-endian 16-bit user count field as found on the device.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct CountField([u8; 2]);

impl Debug for CountField {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let CountField([lsb, msb]) = *self;
        f.write_fmt(format_args!("CountField({lsb:#04x}, {msb:#04x})"))
    }
}

impl CountField {
    pub(crate) const fn from_bytes(bytes: [u8; 2]) -> Self {
        CountField(bytes)
    }

    pub(crate) const fn from_count(count: u16) -> Self {
        CountField(count.to_le_bytes())
    }

    pub(crate) const fn to_bytes(self) -> [u8; 2] {
        self.0
    }

    pub(crate) const fn is_erased(self) -> bool {
        self.0[0] == ERASED && self.0[1] == ERASED
    }

    /// Number of users. A never written field reads as all ones and holds no users.
    pub(crate) const fn to_count(self) -> u16 {
        if self.is_erased() {
            0
        } else {
            u16::from_le_bytes(self.0)
        }
    }
}

/// Internal EEPROM: eight flags per byte, bit `n` belongs to the `n`th user of the byte.
pub(crate) const fn packed_flag(byte: u8, bit: u8) -> bool {
    byte & (1 << bit) != 0
}

pub(crate) const fn toggle_packed_flag(byte: u8, bit: u8) -> u8 {
    byte ^ (1 << bit)
}

/// Paged EEPROM: one byte per user, anything but zero is authorized.
pub(crate) const fn byte_flag(byte: u8) -> bool {
    byte != 0
}

pub(crate) const fn flag_byte(auth: bool) -> u8 {
    auth as u8
}
