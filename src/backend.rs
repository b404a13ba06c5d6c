use crate::error::Error;
use crate::layout::Layout;
use crate::platform::Platform;

/// Whether [`crate::AccessTable::add_user`] refuses tags that are already registered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DuplicatePolicy {
    /// Scan for the tag first and report `AlreadyExists`.
    Reject,
    /// Append without looking, a tag may then be registered more than once and lookups return
    /// the oldest record.
    Allow,
}

/// Storage form of the table. Implemented by [`crate::InternalBackend`] for byte addressable
/// memory and by [`crate::PagedBackend`] for paged devices.
///
/// Indices passed in are not range checked; [`crate::AccessTable`] only passes indices below
/// [`Backend::user_count`], or equal to it when appending.
pub trait Backend {
    type Device: Platform;

    /// Duplicate handling a table built on this backend starts out with.
    const DEFAULT_DUPLICATE_POLICY: DuplicatePolicy;

    fn layout(&self) -> &Layout;

    fn device(&self) -> &Self::Device;

    fn device_mut(&mut self) -> &mut Self::Device;

    fn into_device(self) -> Self::Device;

    /// Total number of registered users.
    fn user_count(&mut self) -> Result<u16, Error>;

    /// Reads the tag of `index` into `tag`, which is exactly `tag_len` bytes long.
    fn read_tag(&mut self, index: u16, tag: &mut [u8]) -> Result<(), Error>;

    fn read_auth(&mut self, index: u16) -> Result<bool, Error>;

    /// Stores a changed flag. Only called when `auth` differs from the stored value.
    fn write_auth(&mut self, index: u16, auth: bool) -> Result<(), Error>;

    /// Stores a new record at `index == user_count()` and bumps the count.
    fn append(&mut self, index: u16, tag: &[u8], auth: bool) -> Result<(), Error>;

    /// Erases the whole device.
    fn clear(&mut self) -> Result<(), Error>;

    /// The persisted count field. For paged devices this is the total, encoded the same way.
    fn count_bytes(&mut self) -> Result<[u8; 2], Error>;
}
