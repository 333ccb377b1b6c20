//! # 索引节点层
//!
//! [`InodeTable`] 保证同一扇区上的 inode 在内存中只有一个句柄，
//! 并负责 inode 的创建、打开、关闭与延迟回收；
//! [`Inode`] 提供按字节偏移的读写，写越过文件末尾时按需增长。
//!
//! 打开表由一把互斥锁保护，每个 inode 自带一把读写锁：
//! 读与长度查询共享，写、增长、删除与关闭独占。
//! 加锁顺序总是 打开表 → inode → 空闲扇区分配器。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use enumflags2::bitflags;
use spin::{Mutex, RwLock};

use crate::layout::{DiskInode, DiskInodeKind};
use crate::sector::{self, SectorId};
use crate::{DataBlock, Error, SECTOR_SIZE, SectorAllocator};

/// 内存中的 inode 句柄
#[derive(Debug)]
pub struct Inode {
    /// inode 记录所在扇区，也是 inode 的编号
    sector: SectorId,
    block_device: Arc<dyn BlockDevice>,
    free_map: Arc<dyn SectorAllocator>,
    inner: RwLock<InodeInner>,
}

#[derive(Debug)]
struct InodeInner {
    /// 打开者个数
    open_cnt: usize,
    /// 已被删除，最后一个打开者关闭时回收
    removed: bool,
    /// 大于 0 时拒绝写入，用于正在执行的程序映像
    deny_write_cnt: usize,
    /// 磁盘记录的副本，每次修改后立即写回
    disk: DiskInode,
}

/// 打开的 inode 表
#[derive(Debug)]
pub struct InodeTable {
    block_device: Arc<dyn BlockDevice>,
    free_map: Arc<dyn SectorAllocator>,
    open_inodes: Mutex<Vec<Arc<Inode>>>,
}

#[repr(C)]
#[derive(Debug)]
pub struct Stat {
    pub inode: u64,
    pub kind: StatKind,
    /// 文件字节数
    pub size: u64,
    /// 占用的扇区数，含索引块
    pub blocks: u64,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    FILE = 0o100000,
}

impl InodeTable {
    pub fn new(block_device: Arc<dyn BlockDevice>, free_map: Arc<dyn SectorAllocator>) -> Self {
        Self {
            block_device,
            free_map,
            open_inodes: Mutex::new(Vec::new()),
        }
    }

    /// 在扇区`sector`上创建长度为`length`的 inode。
    ///
    /// 覆盖`[0, length)`的数据块全部分配并清零，空文件也分配一块；
    /// 只有全部分配成功才写入记录，失败时本次分配的扇区全部归还。
    pub fn create(&self, sector: SectorId, length: usize, kind: DiskInodeKind) -> Result<(), Error> {
        let data_blocks = DiskInode::data_blocks(length);
        if !DiskInode::addressable(data_blocks - 1) {
            return Err(Error::TooLarge(length));
        }

        let new_sectors = self
            .free_map
            .allocate_many(DiskInode::total_sectors(data_blocks))?;

        let mut disk_inode = DiskInode::new(kind);
        disk_inode.grow(0..data_blocks, new_sectors, &self.block_device);
        disk_inode.length = length as u32;
        sector::write(&self.block_device, sector, &disk_inode);

        log::debug!("create inode {sector}: {kind:?}, {length} bytes in {data_blocks} blocks");
        Ok(())
    }

    /// 打开扇区`sector`上的 inode。
    /// 已打开时返回同一个句柄并增加打开计数。
    pub fn open(&self, sector: SectorId) -> Result<Arc<Inode>, Error> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.iter().find(|inode| inode.sector == sector) {
            inode.inner.write().open_cnt += 1;
            return Ok(Arc::clone(inode));
        }

        let disk: DiskInode = sector::read(&self.block_device, sector);
        if !disk.is_valid() {
            log::error!("sector {sector} does not hold an inode");
            return Err(Error::BadMagic(sector));
        }

        let inode = Arc::new(Inode {
            sector,
            block_device: self.block_device.clone(),
            free_map: self.free_map.clone(),
            inner: RwLock::new(InodeInner {
                open_cnt: 1,
                removed: false,
                deny_write_cnt: 0,
                disk,
            }),
        });
        open_inodes.push(inode.clone());

        log::debug!("open inode {sector}");
        Ok(inode)
    }

    /// 关闭句柄。
    /// 最后一个打开者关闭时从表中移除；若已被删除，归还它可达的全部扇区与记录扇区。
    pub fn close(&self, inode: Arc<Inode>) {
        let mut open_inodes = self.open_inodes.lock();
        let mut inner = inode.inner.write();

        assert!(inner.open_cnt > 0, "inode {} closed too many times", inode.sector);
        inner.open_cnt -= 1;
        if inner.open_cnt > 0 {
            return;
        }

        open_inodes.retain(|open| !Arc::ptr_eq(open, &inode));
        log::debug!("close inode {}", inode.sector);

        if inner.removed {
            let sectors = inner.disk.clear(&self.block_device);
            log::debug!(
                "release inode {} with {} sectors",
                inode.sector,
                sectors.len()
            );
            for id in sectors {
                self.free_map.release(id);
            }
            self.free_map.release(inode.sector);
        }
    }

    /// 当前打开的 inode 个数
    pub fn open_count(&self) -> usize {
        self.open_inodes.lock().len()
    }
}

impl Inode {
    /// 再次打开同一个 inode
    pub fn reopen(self: &Arc<Self>) -> Arc<Self> {
        self.inner.write().open_cnt += 1;
        Arc::clone(self)
    }

    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    pub fn length(&self) -> usize {
        self.inner.read().disk.length as usize
    }

    pub fn is_dir(&self) -> bool {
        self.inner.read().disk.is_dir()
    }

    pub fn is_removed(&self) -> bool {
        self.inner.read().removed
    }

    pub fn open_count(&self) -> usize {
        self.inner.read().open_cnt
    }

    /// 标记删除；扇区在最后一个打开者关闭时才回收
    pub fn remove(&self) {
        self.inner.write().removed = true;
        log::debug!("remove inode {}", self.sector);
    }

    /// 禁止写入，每个打开者至多调用一次
    pub fn deny_write(&self) {
        let mut inner = self.inner.write();
        inner.deny_write_cnt += 1;
        assert!(
            inner.deny_write_cnt <= inner.open_cnt,
            "inode {} denied writes more times than it is open",
            self.sector
        );
    }

    /// 重新允许写入，调用过 [`Inode::deny_write`] 的打开者须在关闭前调用
    pub fn allow_write(&self) {
        let mut inner = self.inner.write();
        assert!(inner.deny_write_cnt > 0, "inode {} allows writes it never denied", self.sector);
        assert!(inner.deny_write_cnt <= inner.open_cnt);
        inner.deny_write_cnt -= 1;
    }

    /// 存放字节`pos`的扇区，越过文件末尾或未分配时为空
    pub fn sector_of(&self, pos: usize) -> Option<SectorId> {
        self.inner.read().disk.sector_of(pos, &self.block_device)
    }

    /// 增长文件使字节`target`有效，返回存放它的扇区
    pub fn extend(&self, target: usize) -> Result<SectorId, Error> {
        let mut inner = self.inner.write();
        self.extend_to(&mut inner, target)
    }

    /// 从`offset`处读出数据填充`buf`，返回实际读取的字节数。
    /// 不会读过文件末尾。
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let inner = self.inner.read();
        let length = inner.disk.length as usize;
        if offset >= length {
            return 0;
        }
        let end = (offset + buf.len()).min(length);

        let mut start = offset;
        let mut read_size = 0;
        while start < end {
            let Some(sector) = inner.disk.sector_of(start, &self.block_device) else {
                log::warn!("inode {} has no sector for byte {start}", self.sector);
                break;
            };

            let sector_offset = start % SECTOR_SIZE;
            let chunk = (end - start).min(SECTOR_SIZE - sector_offset);
            let dest = &mut buf[read_size..read_size + chunk];

            if chunk == SECTOR_SIZE {
                self.block_device.read_block(sector.index(), dest);
            } else {
                sector::map(&self.block_device, sector, |data_block: &DataBlock| {
                    dest.copy_from_slice(&data_block[sector_offset..sector_offset + chunk])
                });
            }

            read_size += chunk;
            start += chunk;
        }

        read_size
    }

    /// 把`buf`写入`offset`处，返回实际写入的字节数。
    ///
    /// 目标扇区不存在时先增长文件；增长失败则提前结束。
    /// 被禁写时不写入任何字节。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut inner = self.inner.write();
        if inner.deny_write_cnt > 0 {
            log::warn!("inode {} is write-denied", self.sector);
            return 0;
        }

        let mut written_size = 0;
        while written_size < buf.len() {
            let start = offset + written_size;
            let sector = match inner.disk.sector_of(start, &self.block_device) {
                Some(sector) => sector,
                None => match self.extend_to(&mut inner, start) {
                    Ok(sector) => sector,
                    Err(err) => {
                        log::warn!("inode {} stops growing at byte {start}: {err}", self.sector);
                        break;
                    }
                },
            };

            let sector_offset = start % SECTOR_SIZE;
            let chunk = (buf.len() - written_size).min(SECTOR_SIZE - sector_offset);
            let src = &buf[written_size..written_size + chunk];

            if chunk == SECTOR_SIZE {
                self.block_device.write_block(sector.index(), src);
            } else {
                sector::map_mut(&self.block_device, sector, |data_block: &mut DataBlock| {
                    data_block[sector_offset..sector_offset + chunk].copy_from_slice(src)
                });
            }

            // 文件末尾后移，立刻写回记录
            if start + chunk > inner.disk.length as usize {
                inner.disk.length = (start + chunk) as u32;
                self.sync(&inner);
            }

            written_size += chunk;
        }

        written_size
    }

    pub fn stat(&self) -> Stat {
        let inner = self.inner.read();
        let blocks =
            DiskInode::total_sectors(DiskInode::data_blocks(inner.disk.length as usize));
        Stat {
            inode: self.sector.raw() as u64,
            kind: inner.disk.kind().into(),
            size: inner.disk.length as u64,
            blocks: blocks as u64,
        }
    }
}

impl Inode {
    /// 持有写锁时增长文件。
    ///
    /// 所需扇区一次分配完，任何一次分配失败都会归还本次已分配的扇区，
    /// 此时记录保持原样，可以安全重试。
    fn extend_to(&self, inner: &mut InodeInner, target: usize) -> Result<SectorId, Error> {
        let target_block = target / SECTOR_SIZE;
        if !DiskInode::addressable(target_block) {
            return Err(Error::TooLarge(target));
        }

        let length = inner.disk.length as usize;
        let allocated = DiskInode::data_blocks(length);
        if target_block >= allocated {
            let count = DiskInode::total_sectors(target_block + 1)
                - DiskInode::total_sectors(allocated);
            let new_sectors = self.free_map.allocate_many(count)?;
            inner
                .disk
                .grow(allocated..target_block + 1, new_sectors, &self.block_device);
            log::debug!(
                "inode {} grows from {allocated} to {} blocks with {count} sectors",
                self.sector,
                target_block + 1
            );
        }

        if target >= length {
            inner.disk.length = (target + 1) as u32;
        }
        self.sync(inner);

        Ok(inner
            .disk
            .block_id(target_block, &self.block_device)
            .expect("block below the allocated end is mapped"))
    }

    /// 把记录写回磁盘
    #[inline]
    fn sync(&self, inner: &InodeInner) {
        sector::write(&self.block_device, self.sector, &inner.disk);
    }
}

impl From<DiskInodeKind> for StatKind {
    #[inline]
    fn from(kind: DiskInodeKind) -> Self {
        match kind {
            DiskInodeKind::Directory => Self::DIR,
            DiskInodeKind::File => Self::FILE,
        }
    }
}
