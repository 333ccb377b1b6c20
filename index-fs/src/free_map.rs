//! # 空闲扇区分配器
//!
//! inode 层只通过 [`SectorAllocator`] 分配与归还单个扇区；
//! [`FreeMap`] 是格式化时建立在磁盘位图上的实现。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Debug;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::Error;
use crate::layout::Bitmap;
use crate::sector::SectorId;

pub trait SectorAllocator: Send + Sync + Debug {
    /// 分配一个扇区，空间耗尽时返回空
    fn allocate(&self) -> Option<SectorId>;

    /// 归还扇区；同一扇区不可归还两次
    fn release(&self, id: SectorId);

    /// 一次性分配`count`个扇区。
    /// 中途耗尽时归还本次已分配的全部扇区，不留下泄漏。
    fn allocate_many(&self, count: usize) -> Result<Vec<SectorId>, Error> {
        let mut sectors = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate() {
                Some(id) => sectors.push(id),
                None => {
                    log::warn!(
                        "out of space after {} of {count} sectors, rolling back",
                        sectors.len()
                    );
                    sectors.into_iter().for_each(|id| self.release(id));
                    return Err(Error::NoSpace);
                }
            }
        }
        Ok(sectors)
    }
}

/// 磁盘上的空闲位图
#[derive(Debug)]
pub struct FreeMap {
    block_device: Arc<dyn BlockDevice>,
    bitmap: Mutex<Bitmap>,
}

impl FreeMap {
    #[inline]
    pub(crate) fn new(block_device: Arc<dyn BlockDevice>, bitmap: Bitmap) -> Self {
        Self {
            block_device,
            bitmap: Mutex::new(bitmap),
        }
    }

    /// 尚未分配的扇区数
    pub fn free_count(&self) -> usize {
        self.bitmap.lock().count_free(&self.block_device)
    }

    /// 位图管理的扇区总数
    pub fn capacity(&self) -> usize {
        self.bitmap.lock().capacity()
    }
}

impl SectorAllocator for FreeMap {
    fn allocate(&self) -> Option<SectorId> {
        let id = self.bitmap.lock().alloc(&self.block_device);
        log::trace!("allocate sector {id:?}");
        id
    }

    fn release(&self, id: SectorId) {
        log::trace!("release sector {id}");
        self.bitmap.lock().dealloc(&self.block_device, id);
    }
}
