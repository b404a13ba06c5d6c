use crate::backend::{Backend, DuplicatePolicy};
use crate::error::Error;
use crate::layout::{COUNT_FIELD_SIZE, Layout, LayoutKind};
use crate::platform::{ByteOps, Platform};
use crate::raw::{self, CountField};
use alloc::vec;
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// In-memory copy of one page of the device.
///
/// All writes to a paged device go through this buffer: the owning page is loaded, the fields
/// of one record are changed and the whole page is written back at once.
pub struct PageBuffer {
    page: Option<u16>,
    data: Vec<u8>,
    count_offset: usize,
    // count field as last seen on the device, used to keep the cached total in sync
    persisted_count: u16,
    // edited through `as_mut_bytes` and not stored yet
    dirty: bool,
}

impl PageBuffer {
    fn new(layout: &Layout) -> Self {
        Self {
            page: None,
            data: vec![raw::ERASED; layout.page_size() as usize],
            count_offset: layout.count_offset() as usize,
            persisted_count: 0,
            dirty: false,
        }
    }

    /// Page currently held, `None` before the first load or after a device error.
    pub fn page(&self) -> Option<u16> {
        self.page
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Changes only become persistent with [`PagedBackend::store_page`]. Until then table
    /// operations ignore the buffer and reload the page from the device, dropping the changes.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }

    /// Whether the buffer holds `page` as it is on the device.
    fn holds(&self, page: u16) -> bool {
        self.page == Some(page) && !self.dirty
    }

    fn count_field(&self) -> CountField {
        let at = self.count_offset;
        CountField::from_bytes([self.data[at], self.data[at + 1]])
    }

    fn set_count(&mut self, count: u16) {
        let at = self.count_offset;
        self.data[at..at + COUNT_FIELD_SIZE as usize]
            .copy_from_slice(&CountField::from_count(count).to_bytes());
    }

    fn invalidate(&mut self) {
        self.page = None;
        self.dirty = false;
    }
}

/// Table on an external paged device like a SPI EEPROM.
///
/// Successive users are assigned to successive pages so that the page rewrites are spread over
/// the whole device. Every page keeps its own user count, the total is summed up on first use
/// and cached afterwards. The cache is only maintained by this instance, modifications of the
/// device by anybody else go unnoticed.
///
/// Duplicate tags are allowed by default as lookups are expensive on a large table.
pub struct PagedBackend<T: Platform> {
    pub(crate) hal: T,
    pub(crate) layout: Layout,
    buffer: PageBuffer,
    total: Option<u16>,
}

impl<T: Platform> PagedBackend<T> {
    pub fn new(hal: T, layout: Layout) -> Result<Self, Error> {
        if layout.kind() != LayoutKind::Paged {
            return Err(Error::CapacityMismatch);
        }
        if !(layout.page_size() as usize).is_multiple_of(T::PAGE_SIZE) {
            return Err(Error::InvalidPageSize);
        }
        if hal.capacity() < layout.device_size() as usize {
            return Err(Error::CapacityMismatch);
        }

        Ok(Self {
            buffer: PageBuffer::new(&layout),
            hal,
            layout,
            total: None,
        })
    }

    pub fn page_buffer(&self) -> &PageBuffer {
        &self.buffer
    }

    pub fn page_buffer_mut(&mut self) -> &mut PageBuffer {
        &mut self.buffer
    }

    /// The cached total, if it has been computed already.
    pub fn cached_user_count(&self) -> Option<u16> {
        self.total
    }

    /// Reads `page` into the page buffer. Does nothing if the page is already buffered and
    /// unchanged.
    pub fn load_page(&mut self, page: u16) -> Result<(), Error> {
        if page >= self.layout.pages() {
            return Err(Error::InvalidIndex(page));
        }
        if self.buffer.holds(page) {
            return Ok(());
        }

        #[cfg(feature = "defmt")]
        trace!("load_page: #{} @{:#08x}", page, self.layout.page_base(page));

        if self
            .hal
            .read(self.layout.page_base(page), &mut self.buffer.data)
            .is_err()
        {
            self.buffer.invalidate();
            return Err(Error::DeviceError);
        }
        self.buffer.page = Some(page);
        self.buffer.dirty = false;
        // the cached total was summed from clamped counts
        self.buffer.persisted_count = self.clamp_page_count(self.buffer.count_field().to_count());
        Ok(())
    }

    /// Writes the buffered page back to the device. Does nothing if no page is buffered.
    pub fn store_page(&mut self) -> Result<(), Error> {
        let Some(page) = self.buffer.page else {
            return Ok(());
        };

        #[cfg(feature = "defmt")]
        trace!("store_page: #{} @{:#08x}", page, self.layout.page_base(page));

        if self
            .hal
            .write_page(self.layout.page_base(page), &self.buffer.data)
            .is_err()
        {
            // the page may be partially written, nothing we hold can be trusted anymore
            self.buffer.invalidate();
            self.total = None;
            return Err(Error::DeviceError);
        }

        self.buffer.dirty = false;
        let count = self.clamp_page_count(self.buffer.count_field().to_count());
        if let Some(total) = self.total {
            let total = total as i32 - self.buffer.persisted_count as i32 + count as i32;
            self.total = Some(total.clamp(0, self.layout.max_users() as i32) as u16);
        }
        self.buffer.persisted_count = count;
        Ok(())
    }

    /// Users stored on `page`.
    pub fn page_user_count(&mut self, page: u16) -> Result<u16, Error> {
        if page >= self.layout.pages() {
            return Err(Error::InvalidIndex(page));
        }
        let mut bytes = [0u8; 2];
        self.read_in_page(page, self.layout.count_offset(), &mut bytes)?;
        let count = CountField::from_bytes(bytes).to_count();
        Ok(self.clamp_page_count(count))
    }

    fn clamp_page_count(&self, count: u16) -> u16 {
        if count > self.layout.users_per_page() {
            #[cfg(feature = "defmt")]
            warn!(
                "page user count {} exceeds {} slots, clamping",
                count,
                self.layout.users_per_page()
            );
            return self.layout.users_per_page();
        }
        count
    }

    /// Reads from the page buffer if it holds `page`, from the device otherwise.
    fn read_in_page(&mut self, page: u16, offset: u32, out: &mut [u8]) -> Result<(), Error> {
        if self.buffer.holds(page) {
            let offset = offset as usize;
            out.copy_from_slice(&self.buffer.data[offset..offset + out.len()]);
            return Ok(());
        }
        self.hal
            .read(self.layout.page_base(page) + offset, out)
            .map_err(|_| Error::DeviceError)
    }
}

impl<T: Platform> Backend for PagedBackend<T> {
    type Device = T;

    const DEFAULT_DUPLICATE_POLICY: DuplicatePolicy = DuplicatePolicy::Allow;

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
        if let Some(total) = self.total {
            return Ok(total);
        }

        let mut total = 0u32;
        for page in 0..self.layout.pages() {
            total += self.page_user_count(page)? as u32;
        }
        // bounded by pages * users_per_page
        let total = total as u16;

        #[cfg(feature = "defmt")]
        trace!("user_count: {}", total);

        self.total = Some(total);
        Ok(total)
    }

    fn read_tag(&mut self, index: u16, tag: &mut [u8]) -> Result<(), Error> {
        let page = self.layout.page_number(index);
        self.read_in_page(page, self.layout.tag_offset(index), tag)
    }

    fn read_auth(&mut self, index: u16) -> Result<bool, Error> {
        let page = self.layout.page_number(index);
        if self.buffer.holds(page) {
            return Ok(raw::byte_flag(
                self.buffer.data[self.layout.auth_offset(index) as usize],
            ));
        }
        let byte = self
            .hal
            .read_byte(self.layout.auth_location(index).address())
            .map_err(|_| Error::DeviceError)?;
        Ok(raw::byte_flag(byte))
    }

    fn write_auth(&mut self, index: u16, auth: bool) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("write_auth: #{} = {}", index, auth);

        self.load_page(self.layout.page_number(index))?;
        self.buffer.data[self.layout.auth_offset(index) as usize] = raw::flag_byte(auth);
        self.store_page()
    }

    fn append(&mut self, index: u16, tag: &[u8], auth: bool) -> Result<(), Error> {
        let page = self.layout.page_number(index);
        let slot = self.layout.slot(index);

        #[cfg(feature = "defmt")]
        trace!("append: #{} -> page {} slot {}", index, page, slot);

        self.load_page(page)?;

        #[cfg(feature = "defmt")]
        {
            let count = self.buffer.count_field().to_count();
            if count != slot {
                warn!("page {} holds {} users, expected {}", page, count, slot);
            }
        }
        if slot >= self.layout.users_per_page() {
            return Err(Error::CountOutOfRange(slot + 1));
        }

        let tag_offset = self.layout.tag_offset(index) as usize;
        self.buffer.data[tag_offset..tag_offset + tag.len()].copy_from_slice(tag);
        self.buffer.data[self.layout.auth_offset(index) as usize] = raw::flag_byte(auth);
        self.buffer.set_count(slot + 1);

        self.store_page()
    }

    fn clear(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("clear");

        self.buffer.invalidate();
        if self.hal.erase_all().is_err() {
            self.total = None;
            return Err(Error::DeviceError);
        }
        self.total = Some(0);
        Ok(())
    }

    fn count_bytes(&mut self) -> Result<[u8; 2], Error> {
        Ok(CountField::from_count(self.user_count()?).to_bytes())
    }
}
