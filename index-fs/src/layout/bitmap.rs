use alloc::sync::Arc;
use block_dev::BlockDevice;

use crate::SECTOR_BITS;
use crate::sector::{self, OnDisk, SectorId};

/// 位图区域内块的结构
#[repr(transparent)]
struct BitmapBlock([u64; SECTOR_BITS / 64]);

unsafe impl OnDisk for BitmapBlock {}

/// 位图区域，每一位记录设备上一个扇区是否已被占用
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始扇区
    start_sector: usize,
    /// 位图占用扇区数
    sectors: usize,
    /// 位图所指示的扇区总数，超出部分的位不可分配
    capacity: usize,
}

/// 扇区在位图中的位置
struct BitPos(usize);

impl Bitmap {
    #[inline]
    pub fn new(start_sector: usize, sectors: usize, capacity: usize) -> Self {
        debug_assert!(capacity <= sectors * SECTOR_BITS);
        Self {
            start_sector,
            sectors,
            capacity,
        }
    }

    /// 指示`capacity`个扇区所需的位图扇区数
    #[inline]
    pub fn sectors_for(capacity: usize) -> usize {
        capacity.div_ceil(SECTOR_BITS)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 清空位图，再标记前`reserved`个扇区已占用
    pub fn init(&self, block_device: &Arc<dyn BlockDevice>, reserved: usize) {
        for block_index in 0..self.sectors {
            sector::write(block_device, self.block(block_index), &BitmapBlock::zeroed());
        }
        for id in 0..reserved {
            let (block_index, group_index, ingroup_index) = BitPos(id).decode();
            sector::map_mut(
                block_device,
                self.block(block_index),
                |bitmap_block: &mut BitmapBlock| bitmap_block.0[group_index] |= 1 << ingroup_index,
            );
        }
    }

    /// 分配新的扇区，返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&self, block_device: &Arc<dyn BlockDevice>) -> Option<SectorId> {
        // 遍历位图区域内所有的块，寻找块内还有剩余空间的bit组(即还有0)
        for block_index in 0..self.sectors {
            let found = sector::map_mut(
                block_device,
                self.block(block_index),
                |bitmap_block: &mut BitmapBlock| {
                    let (group_index, ingroup_index) =
                        bitmap_block
                            .0
                            .iter()
                            .enumerate()
                            .find_map(|(group_index, &bits)| {
                                (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                            })?;

                    let id = BitPos::encode(block_index, group_index, ingroup_index as usize);
                    // 位图末尾多出的位不对应任何扇区
                    if id >= self.capacity {
                        return None;
                    }
                    // 追加新位
                    bitmap_block.0[group_index] |= 1 << ingroup_index;
                    Some(id)
                },
            );

            if let Some(id) = found {
                return SectorId::new(id as u32);
            }
        }

        None
    }

    pub fn dealloc(&self, block_device: &Arc<dyn BlockDevice>, id: SectorId) {
        assert!(id.index() < self.capacity, "sector {id} is outside the device");
        let (block_index, group_index, ingroup_index) = BitPos(id.index()).decode();
        sector::map_mut(
            block_device,
            self.block(block_index),
            |bitmap_block: &mut BitmapBlock| {
                // 编号一定得有对应的位
                assert_ne!(
                    bitmap_block.0[group_index] & (1 << ingroup_index),
                    0,
                    "sector {id} is released twice"
                );
                bitmap_block.0[group_index] -= 1 << ingroup_index;
            },
        );
    }

    /// 未被占用的扇区数
    pub fn count_free(&self, block_device: &Arc<dyn BlockDevice>) -> usize {
        let used: usize = (0..self.sectors)
            .map(|block_index| {
                sector::map(
                    block_device,
                    self.block(block_index),
                    |bitmap_block: &BitmapBlock| {
                        bitmap_block
                            .0
                            .iter()
                            .map(|bits| bits.count_ones() as usize)
                            .sum::<usize>()
                    },
                )
            })
            .sum();
        self.capacity - used
    }
}

impl Bitmap {
    #[inline]
    fn block(&self, block_index: usize) -> SectorId {
        SectorId::new((self.start_sector + block_index) as u32)
            .expect("bitmap never starts at sector 0")
    }
}

impl BitPos {
    /// 线性映射编码得到扇区编号
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> usize {
        block_index * SECTOR_BITS + group_index * 64 + ingroup_index
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut id = self.0;

        let block_index = id / SECTOR_BITS;
        id %= SECTOR_BITS;
        (block_index, id / 64, id % 64)
    }
}
