use thiserror::Error;

/// Errors that can occur while configuring or accessing the table. Regular outcomes like an
/// unknown tag or a full table are not errors, see [`crate::AuthResult`], [`crate::AddOutcome`]
/// and [`crate::SetAuthOutcome`]. The list is marked as non-exhaustive to allow for future
/// additions without breaking the API.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The device is too small for a count field or not a multiple of the page size.
    #[error("invalid device size")]
    InvalidDeviceSize,

    /// The page is too small to hold a count field or doesn't match the device page size.
    #[error("invalid page size")]
    InvalidPageSize,

    /// Tag slots, authorization region and count field don't fit into a page, or the table
    /// would exceed 65535 users.
    #[error("invalid table geometry")]
    InvalidGeometry,

    /// The layout was built for the other storage form or the device is smaller than the layout.
    #[error("layout does not match the device")]
    CapacityMismatch,

    /// Tags have to be exactly as long as the slots of the layout.
    #[error("tag length mismatch: expected {expected}, got {actual}")]
    TagLengthMismatch { expected: u8, actual: u8 },

    /// The index is outside of the registered users.
    #[error("invalid table index {0}")]
    InvalidIndex(u16),

    /// Refused to persist a user count above the capacity of the table.
    #[error("user count {0} out of range")]
    CountOutOfRange(u16),

    /// The internal error value is returned from the provided storage driver.
    #[error("storage device error")]
    DeviceError,
}
