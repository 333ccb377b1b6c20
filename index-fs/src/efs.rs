//! # 卷管理层
//!
//! 构建出磁盘的布局并使用：0 号扇区是超级块，其后是空闲位图，
//! 再之后是根目录的 inode 记录；其余扇区按需分配。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::layout::*;
use crate::sector::OnDisk;
use crate::{Error, FreeMap, Inode, InodeTable, SectorAllocator, SectorId};

#[derive(Debug)]
pub struct IndexFileSystem {
    block_device: Arc<dyn BlockDevice>,
    free_map: Arc<FreeMap>,
    inodes: InodeTable,
    root_sector: SectorId,
}

impl IndexFileSystem {
    /// 把设备的前`total_sectors`个扇区格式化为 index-fs，并创建空的根目录
    pub fn format(block_device: Arc<dyn BlockDevice>, total_sectors: u32) -> Result<Self, Error> {
        let total_sectors = total_sectors as usize;
        let bitmap_sectors = Bitmap::sectors_for(total_sectors);
        // 超级块 + 位图 + 根目录记录 + 根目录的一个数据块
        if total_sectors < 1 + bitmap_sectors + 2 {
            return Err(Error::NoSpace);
        }

        let bitmap = Bitmap::new(1, bitmap_sectors, total_sectors);
        bitmap.init(&block_device, 1 + bitmap_sectors);
        let free_map = Arc::new(FreeMap::new(block_device.clone(), bitmap));
        let inodes = InodeTable::new(block_device.clone(), free_map.clone());

        let root_sector = free_map.allocate().ok_or(Error::NoSpace)?;
        inodes.create(root_sector, 0, DiskInodeKind::Directory)?;

        let mut super_block = SuperBlock::zeroed();
        super_block.init(total_sectors as u32, bitmap_sectors as u32, root_sector);
        block_device.write_block(0, super_block.as_bytes());

        log::info!(
            "format {total_sectors} sectors: {bitmap_sectors} bitmap sectors, root inode at {root_sector}"
        );
        Ok(Self {
            block_device,
            free_map,
            inodes,
            root_sector,
        })
    }

    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        let mut super_block = SuperBlock::zeroed();
        block_device.read_block(0, super_block.as_bytes_mut());
        if !super_block.is_valid() {
            log::error!("error when loading index-fs: bad super block");
            return Err(Error::NotFormatted);
        }
        let root_sector = SectorId::new(super_block.root_sector).ok_or(Error::NotFormatted)?;

        let bitmap = Bitmap::new(
            1,
            super_block.bitmap_sectors as usize,
            super_block.total_sectors as usize,
        );
        let free_map = Arc::new(FreeMap::new(block_device.clone(), bitmap));
        let inodes = InodeTable::new(block_device.clone(), free_map.clone());

        log::info!(
            "mount {} sectors, root inode at {root_sector}",
            super_block.total_sectors
        );
        Ok(Self {
            block_device,
            free_map,
            inodes,
            root_sector,
        })
    }

    #[inline]
    pub fn root_sector(&self) -> SectorId {
        self.root_sector
    }

    #[inline]
    pub fn free_map(&self) -> &Arc<FreeMap> {
        &self.free_map
    }

    #[inline]
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }

    /// 分配记录扇区并在其上创建 inode，返回 inode 编号。
    /// 创建失败时记录扇区一并归还。
    pub fn create_inode(&self, length: usize, kind: DiskInodeKind) -> Result<SectorId, Error> {
        let sector = self.free_map.allocate().ok_or(Error::NoSpace)?;
        if let Err(err) = self.inodes.create(sector, length, kind) {
            self.free_map.release(sector);
            return Err(err);
        }
        Ok(sector)
    }

    #[inline]
    pub fn open(&self, sector: SectorId) -> Result<Arc<Inode>, Error> {
        self.inodes.open(sector)
    }

    #[inline]
    pub fn open_root(&self) -> Result<Arc<Inode>, Error> {
        self.inodes.open(self.root_sector)
    }

    #[inline]
    pub fn close(&self, inode: Arc<Inode>) {
        self.inodes.close(inode)
    }
}
