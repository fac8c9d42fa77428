pub mod checksum;

pub use checksum::{crc16, verify_checksum};
