mod common;

use crate::common::Operation::{Read, Write};
use crate::common::{InternalEeprom, tag};
use access_table::error::Error;
use access_table::{
    AccessTable, AddOutcome, AuthResult, DuplicatePolicy, InternalBackend, Layout, SetAuthOutcome,
    Tag, UserRecord,
};

const AUTH_START: usize = 988;
const COUNT_ADDR: usize = 1021;

fn new_table() -> AccessTable<InternalBackend<InternalEeprom>> {
    AccessTable::internal(InternalEeprom::new(1024), Layout::ARDUINO_EEPROM).unwrap()
}

mod lookup {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_tag_is_not_found() {
        let mut table = new_table();

        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::NotFound);
        assert_eq!(table.find_index(&tag(1)).unwrap(), None);
        // never written count field reads as all ones
        assert_eq!(table.user_count().unwrap(), 0);
        assert_eq!(table.count_bytes().unwrap(), [0xFF, 0xFF]);
    }

    #[test]
    fn added_users_are_found() {
        let mut table = new_table();

        assert_eq!(table.add_user(&tag(1), true).unwrap(), AddOutcome::Added);
        assert_eq!(table.user_count().unwrap(), 1);
        assert_eq!(table.add_user(&tag(2), false).unwrap(), AddOutcome::Added);
        assert_eq!(table.user_count().unwrap(), 2);

        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::Authorized);
        assert_eq!(table.authorize(&tag(2)).unwrap(), AuthResult::Unauthorized);
        assert_eq!(table.authorize(&tag(3)).unwrap(), AuthResult::NotFound);
        assert_eq!(table.find_index(&tag(2)).unwrap(), Some(1));
    }

    #[test]
    fn authorize_never_writes() {
        let mut table = new_table();
        table.add_user(&tag(1), true).unwrap();
        table.device_mut().operations.clear();

        table.authorize(&tag(1)).unwrap();
        table.authorize(&tag(7)).unwrap();

        assert_eq!(table.device().writes(), 0);
    }

    #[test]
    fn lookup_reads_only_registered_slots() {
        let mut table = new_table();
        table.add_user(&tag(1), true).unwrap();
        table.add_user(&tag(2), true).unwrap();
        table.device_mut().operations.clear();

        assert_eq!(table.find_index(&tag(9)).unwrap(), None);

        assert_eq!(
            table.device().operations,
            vec![
                Read {
                    offset: COUNT_ADDR as _,
                    len: 2
                },
                Read { offset: 0, len: 4 },
                Read { offset: 4, len: 4 },
            ]
        );
    }

    #[test]
    fn tag_length_must_match_layout() {
        let mut table = new_table();
        let long = Tag::from_array(&[1, 2, 3, 4, 5, 6, 7]);

        assert_eq!(
            table.authorize(&long),
            Err(Error::TagLengthMismatch {
                expected: 4,
                actual: 7
            })
        );
        assert_eq!(
            table.add_user(&long, true),
            Err(Error::TagLengthMismatch {
                expected: 4,
                actual: 7
            })
        );
        assert_eq!(table.user_count().unwrap(), 0);
    }

    #[test]
    fn wider_tags_with_custom_layout() {
        let layout = Layout::internal(512, 40, 7).unwrap();
        let mut table = AccessTable::internal(InternalEeprom::new(512), layout).unwrap();
        let uid = Tag::from_array(&[0x04, 0x5A, 0x11, 0x22, 0x33, 0x44, 0x80]);

        assert_eq!(table.add_user(&uid, true).unwrap(), AddOutcome::Added);
        assert_eq!(table.authorize(&uid).unwrap(), AuthResult::Authorized);
        assert_eq!(&table.device().buf[0..7], uid.as_bytes());
    }
}

mod add {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicates_are_rejected() {
        let mut table = new_table();
        assert_eq!(table.duplicate_policy(), DuplicatePolicy::Reject);

        assert_eq!(table.add_user(&tag(1), true).unwrap(), AddOutcome::Added);
        assert_eq!(
            table.add_user(&tag(1), false).unwrap(),
            AddOutcome::AlreadyExists
        );
        assert_eq!(table.user_count().unwrap(), 1);
        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::Authorized);
    }

    #[test]
    fn duplicates_when_allowed() {
        let mut table = new_table().with_duplicate_policy(DuplicatePolicy::Allow);

        assert_eq!(table.add_user(&tag(1), false).unwrap(), AddOutcome::Added);
        assert_eq!(table.add_user(&tag(1), true).unwrap(), AddOutcome::Added);
        assert_eq!(table.user_count().unwrap(), 2);

        // the oldest record wins
        assert_eq!(table.find_index(&tag(1)).unwrap(), Some(0));
        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::Unauthorized);
    }

    #[test]
    fn persisted_layout() {
        let mut table = new_table();
        table
            .add_user(&Tag::from_array(&[0xDE, 0xAD, 0xBE, 0xEF]), true)
            .unwrap();
        table
            .add_user(&Tag::from_array(&[0x01, 0x02, 0x03, 0x04]), false)
            .unwrap();

        let buf = &table.device().buf;
        assert_eq!(&buf[0..8], &[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04]);
        // erased byte, bit 1 cleared for the second user
        assert_eq!(buf[AUTH_START], 0b1111_1101);
        assert_eq!(&buf[COUNT_ADDR..COUNT_ADDR + 2], &[2, 0]);
        assert_eq!(buf[COUNT_ADDR + 2], 0xFF);
    }

    #[test]
    fn ninth_user_uses_next_auth_byte() {
        let mut table = new_table();
        table.clear_table().unwrap();
        for n in 0..9 {
            table.add_user(&tag(n), n == 8).unwrap();
        }

        let buf = &table.device().buf;
        assert_eq!(buf[AUTH_START], 0);
        assert_eq!(buf[AUTH_START + 1], 0b0000_0001);
    }

    #[test]
    fn unchanged_auth_bit_is_not_written() {
        let mut table = new_table();
        table.clear_table().unwrap();
        table.device_mut().operations.clear();

        table.add_user(&tag(1), false).unwrap();

        assert_eq!(
            table.device().operations,
            vec![
                Read {
                    offset: COUNT_ADDR as _,
                    len: 2
                },
                Read {
                    offset: COUNT_ADDR as _,
                    len: 2
                },
                Write { offset: 0, len: 4 },
                Read {
                    offset: AUTH_START as _,
                    len: 1
                },
                Write {
                    offset: COUNT_ADDR as _,
                    len: 2
                },
            ]
        );
    }

    #[test]
    fn table_full() {
        let mut table = new_table();

        for n in 0..247 {
            assert_eq!(table.add_user(&tag(n), n % 2 == 0).unwrap(), AddOutcome::Added);
            assert_eq!(table.user_count().unwrap(), n as u16 + 1);
        }
        assert_eq!(table.add_user(&tag(1000), true).unwrap(), AddOutcome::Full);
        assert_eq!(table.user_count().unwrap(), 247);

        // duplicates are still reported as such
        assert_eq!(
            table.add_user(&tag(5), true).unwrap(),
            AddOutcome::AlreadyExists
        );
        assert_eq!(table.authorize(&tag(246)).unwrap(), AuthResult::Authorized);
        assert_eq!(table.authorize(&tag(245)).unwrap(), AuthResult::Unauthorized);
    }
}

mod set_authorization {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn changed_then_unchanged_writes_once() {
        let mut table = new_table();
        table.add_user(&tag(1), true).unwrap();
        table.device_mut().operations.clear();

        assert_eq!(
            table.set_authorization(&tag(1), false).unwrap(),
            SetAuthOutcome::Changed
        );
        assert_eq!(
            table.set_authorization(&tag(1), false).unwrap(),
            SetAuthOutcome::Unchanged
        );

        assert_eq!(table.device().writes(), 1);
        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::Unauthorized);
    }

    #[test]
    fn only_the_users_bit_flips() {
        let mut table = new_table();
        table.clear_table().unwrap();
        for n in 0..8 {
            table.add_user(&tag(n), true).unwrap();
        }
        assert_eq!(table.device().buf[AUTH_START], 0xFF);

        table.set_authorization(&tag(3), false).unwrap();
        assert_eq!(table.device().buf[AUTH_START], 0b1111_0111);

        table.set_authorization(&tag(3), true).unwrap();
        assert_eq!(table.device().buf[AUTH_START], 0xFF);
    }

    #[test]
    fn unknown_tag() {
        let mut table = new_table();
        table.add_user(&tag(1), true).unwrap();

        assert_eq!(
            table.set_authorization(&tag(2), true).unwrap(),
            SetAuthOutcome::NotFound
        );
    }
}

mod clear {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clear_table_forgets_all_users() {
        let mut table = new_table();
        table.add_user(&tag(1), true).unwrap();
        table.add_user(&tag(2), true).unwrap();

        table.clear_table().unwrap();

        assert_eq!(table.user_count().unwrap(), 0);
        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::NotFound);
        assert_eq!(table.count_bytes().unwrap(), [0, 0]);
        assert!(table.device().buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_fill_without_chip_erase() {
        let mut table = new_table();
        table.device_mut().operations.clear();

        table.clear_table().unwrap();

        assert_eq!(table.device().writes(), 1024);
    }
}

mod persistence {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn records_survive_reopening() {
        let mut table = new_table();
        table.add_user(&tag(1), true).unwrap();
        table.add_user(&tag(2), false).unwrap();
        let eeprom = table.into_device();

        let mut table = AccessTable::internal(eeprom, Layout::ARDUINO_EEPROM).unwrap();
        assert_eq!(table.user_count().unwrap(), 2);
        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::Authorized);
        assert_eq!(table.authorize(&tag(2)).unwrap(), AuthResult::Unauthorized);
    }

    #[test]
    fn corrupt_count_is_clamped() {
        let mut eeprom = InternalEeprom::new(1024);
        eeprom.buf[COUNT_ADDR] = 0x00;
        eeprom.buf[COUNT_ADDR + 1] = 0x10;
        let mut table = AccessTable::internal(eeprom, Layout::ARDUINO_EEPROM).unwrap();

        assert_eq!(table.user_count().unwrap(), 247);
        assert_eq!(table.add_user(&tag(1), true).unwrap(), AddOutcome::Full);
    }

    #[test]
    fn record_by_index() {
        let mut table = new_table();
        assert_eq!(table.record(0), Err(Error::InvalidIndex(0)));

        table.add_user(&tag(42), true).unwrap();
        assert_eq!(
            table.record(0).unwrap(),
            UserRecord {
                index: 0,
                tag: tag(42),
                authorized: true
            }
        );
        assert_eq!(table.record(1), Err(Error::InvalidIndex(1)));
    }
}

mod device {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn layout_must_match_device() {
        assert!(matches!(
            AccessTable::internal(InternalEeprom::new(1024), Layout::SPI_25LC1024),
            Err(Error::CapacityMismatch)
        ));
        assert!(matches!(
            AccessTable::internal(InternalEeprom::new(512), Layout::ARDUINO_EEPROM),
            Err(Error::CapacityMismatch)
        ));
    }

    #[test]
    fn device_errors_propagate() {
        let eeprom = InternalEeprom::new_with_fault(1024, 0);
        let mut table = AccessTable::internal(eeprom, Layout::ARDUINO_EEPROM).unwrap();

        assert_eq!(table.authorize(&tag(1)), Err(Error::DeviceError));
        assert_eq!(table.add_user(&tag(1), true), Err(Error::DeviceError));

        table.device_mut().disable_faults();
        assert_eq!(table.add_user(&tag(1), true).unwrap(), AddOutcome::Added);
    }

    #[test]
    fn interrupted_add_leaves_record_invisible() {
        // duplicate scan, count read, tag write and auth read succeed, the count write fails
        let eeprom = InternalEeprom::new_with_fault(1024, 4);
        let mut table = AccessTable::internal(eeprom, Layout::ARDUINO_EEPROM).unwrap();

        assert_eq!(table.add_user(&tag(1), true), Err(Error::DeviceError));
        assert_eq!(table.device().writes(), 1);

        table.device_mut().disable_faults();
        assert_eq!(table.user_count().unwrap(), 0);
        assert_eq!(table.authorize(&tag(1)).unwrap(), AuthResult::NotFound);
    }
}
