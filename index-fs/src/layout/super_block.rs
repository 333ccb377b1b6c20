use crate::MAGIC;
use crate::sector::{OnDisk, SectorId};

/// 超级块，位于 0 号扇区：
/// - 提供文件系统合法性校验；
/// - 定位空闲位图与根目录
#[derive(Debug)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据扇区数
    pub total_sectors: u32,
    /// 空闲位图占据扇区数，位图紧随超级块
    pub bitmap_sectors: u32,
    /// 根目录 inode 所在扇区
    pub root_sector: u32,
    _reserved: [u32; 124],
}

unsafe impl OnDisk for SuperBlock {}

impl SuperBlock {
    #[inline]
    pub fn init(&mut self, total_sectors: u32, bitmap_sectors: u32, root_sector: SectorId) {
        *self = Self {
            magic: MAGIC,
            total_sectors,
            bitmap_sectors,
            root_sector: root_sector.raw(),
            _reserved: [0; 124],
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}
