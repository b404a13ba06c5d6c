#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

mod backend;
pub mod error;
mod internal;
pub mod layout;
mod paged;
pub mod platform;
mod raw;

/// Length of the UIDs delivered by common 13.56 MHz readers.
pub const NOMINAL_TAG_LENGTH: usize = 4;
/// Triple size ISO 14443 UID.
pub const MAX_TAG_LENGTH: usize = 10;

/// Identifier of a credential as delivered by the tag reader. Compared byte for byte.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    bytes: [u8; MAX_TAG_LENGTH],
    len: u8,
}

impl Tag {
    /// Usage: `Tag::from_array(&[0xDE, 0xAD, 0xBE, 0xEF])`
    pub const fn from_array<const M: usize>(src: &[u8; M]) -> Self {
        Self::from_slice(src)
    }

    /// Panics if `src` is longer than [`MAX_TAG_LENGTH`], see the `TryFrom<&[u8]>` impl for a
    /// fallible version.
    pub const fn from_slice(src: &[u8]) -> Self {
        assert!(src.len() <= MAX_TAG_LENGTH);
        let mut bytes = [0u8; MAX_TAG_LENGTH];
        let mut i = 0;
        while i < src.len() {
            bytes[i] = src[i];
            i += 1;
        }
        Self {
            bytes,
            len: src.len() as u8,
        }
    }

    pub const fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice().split_at(self.len as usize).0
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl TryFrom<&[u8]> for Tag {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Self::Error> {
        if src.len() > MAX_TAG_LENGTH {
            return Err(Error::TagLengthMismatch {
                expected: MAX_TAG_LENGTH as u8,
                actual: src.len().min(u8::MAX as usize) as u8,
            });
        }
        Ok(Self::from_slice(src))
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(")?;
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Tag {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Tag({=[u8]})", self.as_bytes())
    }
}

/// Answer of [`AccessTable::authorize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthResult {
    NotFound,
    Unauthorized,
    Authorized,
}

impl AuthResult {
    pub fn is_authorized(&self) -> bool {
        *self == AuthResult::Authorized
    }
}

/// Outcome of [`AccessTable::set_authorization`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetAuthOutcome {
    NotFound,
    /// The flag already had the requested value, nothing was written.
    Unchanged,
    Changed,
}

/// Outcome of [`AccessTable::add_user`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddOutcome {
    Full,
    /// Only reported with [`DuplicatePolicy::Reject`].
    AlreadyExists,
    Added,
}

/// A registered user, identified by its position in the table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UserRecord {
    pub index: u16,
    pub tag: Tag,
    pub authorized: bool,
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User {}: {} (auth = {})",
            self.index, self.tag, self.authorized as u8
        )
    }
}

/// Snapshot of all registered users for diagnostic output.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDump {
    pub records: Vec<UserRecord>,
    pub user_count: u16,
}

impl fmt::Display for TableDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Printing access table content.")?;
        writeln!(f, "Users:")?;
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        writeln!(f, "Total users: {}", self.user_count)
    }
}

impl TableDump {
    #[cfg(feature = "defmt")]
    pub fn log(&self) {
        defmt::info!("Printing access table content.");
        for record in &self.records {
            defmt::info!(
                "User {}: {} (auth = {})",
                record.index,
                record.tag,
                record.authorized as u8
            );
        }
        defmt::info!("Total users: {}", self.user_count);
    }
}

pub use backend::{Backend, DuplicatePolicy};
pub use internal::InternalBackend;
pub use layout::{AuthLocation, Layout, LayoutKind};
pub use paged::{PageBuffer, PagedBackend};
pub use platform::WriteProtection;

extern crate alloc;

use crate::error::Error;
use crate::platform::Platform;
use alloc::vec::Vec;
use core::fmt;
#[cfg(feature = "defmt")]
use defmt::trace;

/// Persistent table of tags and their authorization.
///
/// Records are appended in insertion order and never removed individually, the only way to get
/// rid of users is [`AccessTable::clear_table`]. Lookups scan all registered users, so they cost
/// `user_count * tag_len` bytes read from the device.
///
/// A single instance must own the device: it may cache the page last written and the user count.
pub struct AccessTable<B: Backend> {
    pub(crate) backend: B,
    pub(crate) duplicates: DuplicatePolicy,
}

impl<T: Platform> AccessTable<InternalBackend<T>> {
    /// Table in byte addressable memory, rejecting duplicate tags.
    pub fn internal(hal: T, layout: Layout) -> Result<Self, Error> {
        Ok(Self::new(InternalBackend::new(hal, layout)?))
    }
}

impl<T: Platform> AccessTable<PagedBackend<T>> {
    /// Table on a paged device, accepting duplicate tags.
    pub fn paged(hal: T, layout: Layout) -> Result<Self, Error> {
        Ok(Self::new(PagedBackend::new(hal, layout)?))
    }
}

impl<B: Backend> AccessTable<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            duplicates: B::DEFAULT_DUPLICATE_POLICY,
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicates
    }

    pub fn layout(&self) -> &Layout {
        self.backend.layout()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn device(&self) -> &B::Device {
        self.backend.device()
    }

    pub fn device_mut(&mut self) -> &mut B::Device {
        self.backend.device_mut()
    }

    pub fn into_device(self) -> B::Device {
        self.backend.into_device()
    }

    fn check_tag(&self, tag: &Tag) -> Result<(), Error> {
        let expected = self.backend.layout().tag_len();
        if tag.len() != expected as usize {
            return Err(Error::TagLengthMismatch {
                expected,
                actual: tag.len() as u8,
            });
        }
        Ok(())
    }

    /// Index of the oldest record holding `tag`.
    pub fn find_index(&mut self, tag: &Tag) -> Result<Option<u16>, Error> {
        self.check_tag(tag)?;

        let len = tag.len();
        let mut stored = [0u8; MAX_TAG_LENGTH];
        for index in 0..self.backend.user_count()? {
            self.backend.read_tag(index, &mut stored[..len])?;
            if stored[..len] == *tag.as_bytes() {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Whether the holder of `tag` may pass. Never writes.
    pub fn authorize(&mut self, tag: &Tag) -> Result<AuthResult, Error> {
        let Some(index) = self.find_index(tag)? else {
            return Ok(AuthResult::NotFound);
        };
        Ok(match self.backend.read_auth(index)? {
            true => AuthResult::Authorized,
            false => AuthResult::Unauthorized,
        })
    }

    /// Grants or revokes access of a registered tag. The device is only written when the flag
    /// actually changes.
    pub fn set_authorization(&mut self, tag: &Tag, desired: bool) -> Result<SetAuthOutcome, Error> {
        let Some(index) = self.find_index(tag)? else {
            return Ok(SetAuthOutcome::NotFound);
        };
        if self.backend.read_auth(index)? == desired {
            return Ok(SetAuthOutcome::Unchanged);
        }

        #[cfg(feature = "defmt")]
        trace!("set_authorization: #{} = {}", index, desired);

        self.backend.write_auth(index, desired)?;
        Ok(SetAuthOutcome::Changed)
    }

    /// Registers `tag` at the next free index.
    pub fn add_user(&mut self, tag: &Tag, auth: bool) -> Result<AddOutcome, Error> {
        self.check_tag(tag)?;

        if self.duplicates == DuplicatePolicy::Reject && self.find_index(tag)?.is_some() {
            return Ok(AddOutcome::AlreadyExists);
        }

        let count = self.backend.user_count()?;
        if count >= self.backend.layout().max_users() {
            return Ok(AddOutcome::Full);
        }

        #[cfg(feature = "defmt")]
        trace!("add_user: {} at #{}", tag, count);

        self.backend.append(count, tag.as_bytes(), auth)?;
        Ok(AddOutcome::Added)
    }

    pub fn user_count(&mut self) -> Result<u16, Error> {
        self.backend.user_count()
    }

    /// Erases the whole device, not just the table. Cannot be undone.
    pub fn clear_table(&mut self) -> Result<(), Error> {
        self.backend.clear()
    }

    pub fn record(&mut self, index: u16) -> Result<UserRecord, Error> {
        if index >= self.backend.user_count()? {
            return Err(Error::InvalidIndex(index));
        }
        self.read_record(index)
    }

    fn read_record(&mut self, index: u16) -> Result<UserRecord, Error> {
        let len = self.backend.layout().tag_len() as usize;
        let mut tag = [0u8; MAX_TAG_LENGTH];
        self.backend.read_tag(index, &mut tag[..len])?;
        Ok(UserRecord {
            index,
            tag: Tag::from_slice(&tag[..len]),
            authorized: self.backend.read_auth(index)?,
        })
    }

    /// All registered users in index order.
    pub fn dump_table(&mut self) -> Result<TableDump, Error> {
        let user_count = self.backend.user_count()?;
        let records = (0..user_count)
            .map(|index| self.read_record(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TableDump {
            records,
            user_count,
        })
    }

    /// The raw little-endian (LSB, MSB) user count.
    pub fn count_bytes(&mut self) -> Result<[u8; 2], Error> {
        self.backend.count_bytes()
    }

    pub fn set_write_protection(&mut self, mode: WriteProtection) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("set_write_protection: {}", mode);

        self.backend
            .device_mut()
            .set_write_protection(mode)
            .map_err(|_| Error::DeviceError)
    }
}
