//! 磁盘上的 inode 记录
//!
//! 记录恰好占一个扇区，数据块按三个区域编址：
//! - 直接索引：记录内的 100 个块编号
//! - 一级索引：记录内的 24 个索引块编号，每个索引块连续存储 128 个**数据块**编号
//! - 二级索引：记录内的 1 个索引块编号，该块连续存储 128 个**一级索引块**编号
//!
//! ## 块索引编码
//!
//! - 减去前面区域的容量，得到区域内的下标
//! - 区域内下标除以索引块的**可编号数量**，得到索引块的位置；取模得到块内位置

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::Range;

use block_dev::BlockDevice;

use crate::sector::{self, OnDisk, SectorId};
use crate::{INODE_MAGIC, SECTOR_SIZE};

/// 索引块的编号容量
const POINTERS_PER_BLOCK: usize = SECTOR_SIZE / 4;

/// 直接索引个数
const DIRECT_COUNT: usize = 100;
/// 一级索引块个数
const INDIRECT_COUNT: usize = 24;
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT_CAP: usize = DIRECT_CAP + INDIRECT_COUNT * POINTERS_PER_BLOCK;
/// 用上二级索引时的编号容量
const DOUBLE_INDIRECT_CAP: usize = INDIRECT_CAP + POINTERS_PER_BLOCK * POINTERS_PER_BLOCK;

/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = DOUBLE_INDIRECT_CAP * SECTOR_SIZE;

/// 索引块
#[repr(transparent)]
pub struct IndexBlock([u32; POINTERS_PER_BLOCK]);

unsafe impl OnDisk for IndexBlock {}

impl IndexBlock {
    #[inline]
    pub fn get(&self, index: usize) -> Option<SectorId> {
        SectorId::new(self.0[index])
    }

    #[inline]
    pub fn set(&mut self, index: usize, id: SectorId) {
        self.0[index] = id.raw();
    }

    /// 已分配的编号
    pub fn iter(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.0.iter().filter_map(|&raw| SectorId::new(raw))
    }
}

#[derive(Debug, Clone)]
#[repr(C)]
pub struct DiskInode {
    /// 类型，见 [`DiskInodeKind`]；保留原始值，任意比特模式都合法
    kind: u32,
    /// 文件字节数，文件结尾的唯一依据
    pub length: u32,
    magic: u32,
    /// 直接索引，存储容量：DIRECT_CAP * SECTOR_SIZE 字节
    direct: [u32; DIRECT_COUNT],
    /// 一级索引块
    indirect: [u32; INDIRECT_COUNT],
    /// 二级索引块
    double_indirect: u32,
}

unsafe impl OnDisk for DiskInode {}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum DiskInodeKind {
    #[default]
    File = 0,
    Directory = 1,
}

/// 逻辑块在 inode 中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockPos {
    /// 直接索引下标
    Direct(usize),
    /// (一级索引块下标, 块内下标)
    Indirect(usize, usize),
    /// (二级索引块内下标, 一级索引块内下标)
    DoubleIndirect(usize, usize),
}

impl BlockPos {
    fn locate(block_index: usize) -> Option<Self> {
        if block_index < DIRECT_CAP {
            Some(Self::Direct(block_index))
        } else if block_index < INDIRECT_CAP {
            // 剔去直接索引的部分
            let index = block_index - DIRECT_CAP;
            Some(Self::Indirect(
                index / POINTERS_PER_BLOCK,
                index % POINTERS_PER_BLOCK,
            ))
        } else if block_index < DOUBLE_INDIRECT_CAP {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT_CAP;
            Some(Self::DoubleIndirect(
                index / POINTERS_PER_BLOCK,
                index % POINTERS_PER_BLOCK,
            ))
        } else {
            None
        }
    }
}

impl DiskInode {
    pub fn new(kind: DiskInodeKind) -> Self {
        Self {
            kind: kind as u32,
            length: 0,
            magic: INODE_MAGIC,
            direct: [0; DIRECT_COUNT],
            indirect: [0; INDIRECT_COUNT],
            double_indirect: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub fn kind(&self) -> DiskInodeKind {
        if self.kind == DiskInodeKind::File as u32 {
            DiskInodeKind::File
        } else {
            DiskInodeKind::Directory
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == DiskInodeKind::Directory
    }

    /// 返回存放字节`pos`的扇区。
    /// `pos`超过文件长度或对应的块未分配时返回空。
    pub fn sector_of(&self, pos: usize, block_device: &Arc<dyn BlockDevice>) -> Option<SectorId> {
        if pos > self.length as usize {
            return None;
        }
        self.block_id(pos / SECTOR_SIZE, block_device)
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 返回其所在的扇区
    pub fn block_id(
        &self,
        block_index: usize,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Option<SectorId> {
        match BlockPos::locate(block_index)? {
            BlockPos::Direct(index) => SectorId::new(self.direct[index]),
            BlockPos::Indirect(outer, inner) => {
                let indirect = SectorId::new(self.indirect[outer])?;
                sector::map(block_device, indirect, |indirect: &IndexBlock| {
                    indirect.get(inner)
                })
            }
            BlockPos::DoubleIndirect(outer, inner) => {
                let double = SectorId::new(self.double_indirect)?;
                let indirect = sector::map(block_device, double, |double: &IndexBlock| {
                    double.get(outer)
                })?;
                sector::map(block_device, indirect, |indirect: &IndexBlock| {
                    indirect.get(inner)
                })
            }
        }
    }

    /// 为逻辑块`blocks`挂上数据块。
    ///
    /// `new_sectors`是一批已分配但未初始化的扇区，个数恰为
    /// `total_sectors(blocks.end) - total_sectors(blocks.start)`。
    /// `blocks.start`之前的块必须都已分配，因此块内下标为 0 时所在的索引块必然尚不存在。
    /// 数据块清零后才挂入，新的索引块整块清零后才写入编号。
    pub fn grow(
        &mut self,
        blocks: Range<usize>,
        new_sectors: Vec<SectorId>,
        block_device: &Arc<dyn BlockDevice>,
    ) {
        let mut new_sectors = new_sectors.into_iter();
        let mut next = || {
            new_sectors
                .next()
                .expect("sectors for growth are counted ahead")
        };

        for block_index in blocks {
            let data = next();
            sector::zeroize(block_device, data);

            match BlockPos::locate(block_index).expect("growth beyond the double indirect region") {
                BlockPos::Direct(index) => self.direct[index] = data.raw(),
                BlockPos::Indirect(outer, inner) => {
                    if inner == 0 {
                        self.indirect[outer] = new_index_block(next(), block_device).raw();
                    }
                    let indirect = SectorId::new(self.indirect[outer])
                        .expect("indirect block precedes its entries");
                    sector::map_mut(block_device, indirect, |indirect: &mut IndexBlock| {
                        indirect.set(inner, data)
                    });
                }
                BlockPos::DoubleIndirect(outer, inner) => {
                    if outer == 0 && inner == 0 {
                        self.double_indirect = new_index_block(next(), block_device).raw();
                    }
                    let double = SectorId::new(self.double_indirect)
                        .expect("double indirect block precedes its entries");
                    let indirect = if inner == 0 {
                        let indirect = new_index_block(next(), block_device);
                        sector::map_mut(block_device, double, |double: &mut IndexBlock| {
                            double.set(outer, indirect)
                        });
                        indirect
                    } else {
                        sector::map(block_device, double, |double: &IndexBlock| double.get(outer))
                            .expect("indirect block precedes its entries")
                    };
                    sector::map_mut(block_device, indirect, |indirect: &mut IndexBlock| {
                        indirect.set(inner, data)
                    });
                }
            }
        }

        debug_assert!(new_sectors.next().is_none());
    }

    /// 清空 inode，返回其可达的全部扇区：数据块与各级索引块
    pub fn clear(&mut self, block_device: &Arc<dyn BlockDevice>) -> Vec<SectorId> {
        let mut sectors = Vec::with_capacity(Self::total_sectors(Self::data_blocks(
            self.length as usize,
        )));

        /******************** 直接索引 ********************/
        sectors.extend(self.direct.iter().filter_map(|&raw| SectorId::new(raw)));
        self.direct.fill(0);
        /******************** END ********************/

        /******************** 一级索引 ********************/
        for indirect in self.indirect.iter().filter_map(|&raw| SectorId::new(raw)) {
            sector::map(block_device, indirect, |indirect: &IndexBlock| {
                sectors.extend(indirect.iter())
            });
            sectors.push(indirect);
        }
        self.indirect.fill(0);
        /******************** END ********************/

        /******************** 二级索引 ********************/
        if let Some(double) = SectorId::new(self.double_indirect) {
            let indirects: Vec<SectorId> =
                sector::map(block_device, double, |double: &IndexBlock| {
                    double.iter().collect()
                });
            for indirect in indirects {
                sector::map(block_device, indirect, |indirect: &IndexBlock| {
                    sectors.extend(indirect.iter())
                });
                sectors.push(indirect);
            }
            sectors.push(double);
        }
        self.double_indirect = 0;
        /******************** END ********************/

        self.length = 0;
        sectors
    }

    /// 长度为`length`的 inode 持有的数据块数，空文件也持有一块
    #[inline]
    pub fn data_blocks(length: usize) -> usize {
        length.div_ceil(SECTOR_SIZE).max(1)
    }

    /// 持有`data_blocks`个数据块时，需要多少个**数据块**和**索引块**
    pub fn total_sectors(data_blocks: usize) -> usize {
        let mut total = data_blocks;

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_CAP {
            total += (data_blocks.min(INDIRECT_CAP) - DIRECT_CAP).div_ceil(POINTERS_PER_BLOCK);
        }

        // 超出一级索引，使用二级索引块及其下的一级索引块
        if data_blocks > INDIRECT_CAP {
            total += 1 + (data_blocks - INDIRECT_CAP).div_ceil(POINTERS_PER_BLOCK);
        }

        total
    }

    /// 能否寻址逻辑块`block_index`
    #[inline]
    pub fn addressable(block_index: usize) -> bool {
        block_index < DOUBLE_INDIRECT_CAP
    }
}

/// 把新分配的扇区初始化为空索引块
fn new_index_block(id: SectorId, block_device: &Arc<dyn BlockDevice>) -> SectorId {
    sector::write(block_device, id, &IndexBlock::zeroed());
    id
}
