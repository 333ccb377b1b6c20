use derive_more::Display;

use crate::SectorId;

/// 文件系统操作可恢复的错误。
///
/// 违反调用约定（如重复释放扇区、禁写计数超过打开计数）属于编程错误，
/// 直接 panic，不在此列。
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲扇区耗尽
    #[display(fmt = "no free sector left on the device")]
    NoSpace,
    /// 扇区上的记录不是 inode
    #[display(fmt = "sector {} does not hold an inode", _0)]
    BadMagic(SectorId),
    /// 偏移超出了 inode 能寻址的最大文件
    #[display(fmt = "offset {} is beyond the largest addressable file", _0)]
    TooLarge(usize),
    /// 设备上没有有效的超级块
    #[display(fmt = "device is not formatted as index-fs")]
    NotFormatted,
}

impl core::error::Error for Error {}
