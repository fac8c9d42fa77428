use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT-FALSE：多项式 0x1021，初值 0xFFFF，不反射，异或输出 0x0000。
///
/// 收发两端必须使用完全相同的参数，否则每个数据包都会被判为损坏。
const CRC16_CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// 计算CRC-16校验和
pub fn crc16(data: &[u8]) -> u16 {
    CRC16_CCITT.checksum(data)
}

/// 校验数据与给定校验和是否一致
pub fn verify_checksum(data: &[u8], checksum: u16) -> bool {
    crc16(data) == checksum
}
