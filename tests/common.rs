#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use access_table::platform::Platform;
use access_table::{Tag, WriteProtection};
use embedded_storage::{ReadStorage, Storage};

pub const SPI_PAGE_SIZE: usize = 256;

/// Byte addressable memory, reads as all ones when new.
pub type InternalEeprom = Eeprom<1>;
/// SPI EEPROM with 256 byte pages, chip erase and block protection.
pub type SpiEeprom = Eeprom<SPI_PAGE_SIZE>;

pub struct Eeprom<const PAGE_SIZE: usize> {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
    pub protection: WriteProtection,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase,
    Protect(WriteProtection),
}

#[derive(Debug, PartialEq)]
pub enum EepromError {
    Fault,
    Protected,
}

impl<const PAGE_SIZE: usize> Eeprom<PAGE_SIZE> {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0xffu8; size],
            fail_after_operation: usize::MAX,
            operations: Vec::new(),
            protection: WriteProtection::None,
        }
    }

    pub fn new_with_fault(size: usize, fail_after_operation: usize) -> Self {
        Self {
            fail_after_operation,
            ..Self::new(size)
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn reads(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Read { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn fault(&self) -> Result<(), EepromError> {
        if self.operations.len() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return Err(EepromError::Fault);
        }
        Ok(())
    }
}

impl<const PAGE_SIZE: usize> ReadStorage for Eeprom<PAGE_SIZE> {
    type Error = EepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.fault()?;
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl<const PAGE_SIZE: usize> Storage for Eeprom<PAGE_SIZE> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(!bytes.is_empty());
        if PAGE_SIZE > 1 {
            // a page write wraps around within the page on real devices
            assert!(offset as usize % PAGE_SIZE + bytes.len() <= PAGE_SIZE);
        }

        self.fault()?;
        let end = offset as usize + bytes.len();
        if end > self.protection.protected_from(self.buf.len() as u32) as usize {
            return Err(EepromError::Protected);
        }

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        self.buf[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl Platform for InternalEeprom {
    const PAGE_SIZE: usize = 1;
}

impl Platform for SpiEeprom {
    const PAGE_SIZE: usize = SPI_PAGE_SIZE;

    fn erase_all(&mut self) -> Result<(), Self::Error> {
        self.fault()?;
        // chip erase is ignored while any block is protected
        if self.protection != WriteProtection::None {
            return Err(EepromError::Protected);
        }
        self.operations.push(Operation::Erase);
        self.buf.fill(0xff);
        Ok(())
    }

    fn set_write_protection(&mut self, mode: WriteProtection) -> Result<(), Self::Error> {
        self.fault()?;
        self.operations.push(Operation::Protect(mode));
        self.protection = mode;
        Ok(())
    }
}

/// Distinct 4 byte tags.
pub fn tag(n: u32) -> Tag {
    Tag::from_array(&n.to_be_bytes())
}
