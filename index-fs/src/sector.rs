//! # 扇区层
//!
//! 没有块缓存：每次访问都直接读写块设备，修改立即落盘。
//! 磁盘上的结构都恰好占满一个扇区，通过 [`OnDisk`] 按类型读写。

use alloc::sync::Arc;
use core::mem;
use core::num::NonZeroU32;
use core::slice;

use block_dev::BlockDevice;
use derive_more::{Display, From, Into};

use crate::{DataBlock, SECTOR_SIZE};

/// 扇区编号。
///
/// 0 号扇区永远不会被分配，磁盘上的 0 表示“未分配”，
/// 因此用 `Option<SectorId>` 表达可能为空的指针。
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct SectorId(NonZeroU32);

impl SectorId {
    /// 从磁盘上的原始编号构造，0 即未分配
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0.get()
    }

    /// 交给块设备使用的编号
    #[inline]
    pub const fn index(self) -> usize {
        self.0.get() as usize
    }
}

/// 恰好占满一个扇区的磁盘结构。
///
/// # Safety
///
/// 实现者必须是 `#[repr(C)]`，大小等于 [`SECTOR_SIZE`]，
/// 且任意比特模式都是合法值。
pub unsafe trait OnDisk: Sized {
    #[inline]
    fn zeroed() -> Self {
        // SAFETY: 任意比特模式（包括全零）都是合法值
        unsafe { mem::zeroed() }
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        debug_assert_eq!(mem::size_of::<Self>(), SECTOR_SIZE);
        // SAFETY: 结构恰为一个扇区且无填充
        unsafe { slice::from_raw_parts((self as *const Self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        debug_assert_eq!(mem::size_of::<Self>(), SECTOR_SIZE);
        // SAFETY: 同上，且任意写入的字节都构成合法值
        unsafe { slice::from_raw_parts_mut((self as *mut Self).cast(), SECTOR_SIZE) }
    }
}

unsafe impl OnDisk for DataBlock {}

pub fn read<T: OnDisk>(dev: &Arc<dyn BlockDevice>, id: SectorId) -> T {
    let mut value = T::zeroed();
    dev.read_block(id.index(), value.as_bytes_mut());
    value
}

#[inline]
pub fn write<T: OnDisk>(dev: &Arc<dyn BlockDevice>, id: SectorId, value: &T) {
    dev.write_block(id.index(), value.as_bytes());
}

/// 读出扇区并处理
#[inline]
pub fn map<T: OnDisk, V>(dev: &Arc<dyn BlockDevice>, id: SectorId, f: impl FnOnce(&T) -> V) -> V {
    f(&read(dev, id))
}

/// 读出扇区，修改后立刻写回
pub fn map_mut<T: OnDisk, V>(
    dev: &Arc<dyn BlockDevice>,
    id: SectorId,
    f: impl FnOnce(&mut T) -> V,
) -> V {
    let mut value = read(dev, id);
    let ret = f(&mut value);
    write(dev, id, &value);
    ret
}

#[inline]
pub fn zeroize(dev: &Arc<dyn BlockDevice>, id: SectorId) {
    write(dev, id, &DataBlock::zeroed());
}
