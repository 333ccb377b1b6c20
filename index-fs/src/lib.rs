#![no_std]

extern crate alloc;

/* index-fs 的整体架构，自上而下 */

// 索引节点层：文件的创建、打开、读写、增长与回收
mod vfs;

// 卷管理层：超级块、格式化与挂载
mod efs;

// 空闲扇区分配器
mod free_map;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 扇区层：扇区编号与对扇区的整块读写
mod sector;

mod error;

pub use self::{
    efs::IndexFileSystem,
    error::Error,
    free_map::{FreeMap, SectorAllocator},
    layout::{DiskInodeKind, MAX_FILE_SIZE},
    sector::SectorId,
    vfs::{Inode, InodeTable, Stat, StatKind},
};

pub use block_dev::BlockDevice;

/// 超级块魔数
pub const MAGIC: u32 = 0x4944_4653;
/// inode 记录魔数，用于识别误读的非 inode 扇区
pub const INODE_MAGIC: u32 = 0x494e_4f44;
pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_BITS: usize = SECTOR_SIZE * 8;

type DataBlock = [u8; SECTOR_SIZE];
