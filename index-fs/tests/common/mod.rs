#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use index_fs::{BlockDevice, FreeMap, IndexFileSystem, SECTOR_SIZE, SectorAllocator, SectorId};

/// 内存里的块设备
#[derive(Debug)]
pub struct RamDisk(Mutex<Vec<[u8; SECTOR_SIZE]>>);

impl RamDisk {
    pub fn new(sectors: usize) -> Arc<Self> {
        Arc::new(Self(Mutex::new(vec![[0; SECTOR_SIZE]; sectors])))
    }

    /// 用垃圾数据填满整个设备，检验清零是否到位
    pub fn filled(sectors: usize, byte: u8) -> Arc<Self> {
        Arc::new(Self(Mutex::new(vec![[byte; SECTOR_SIZE]; sectors])))
    }

    pub fn sector(&self, id: SectorId) -> [u8; SECTOR_SIZE] {
        self.0.lock().unwrap()[id.index()]
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.0.lock().unwrap()[block_id]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.0.lock().unwrap()[block_id].copy_from_slice(buf);
    }
}

/// 只允许再分配有限个扇区的分配器，用来制造空间耗尽
#[derive(Debug)]
pub struct Budget {
    inner: Arc<FreeMap>,
    left: AtomicUsize,
}

impl Budget {
    pub fn new(inner: Arc<FreeMap>, left: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            left: AtomicUsize::new(left),
        })
    }

    pub fn refill(&self, left: usize) {
        self.left.store(left, Ordering::SeqCst);
    }
}

impl SectorAllocator for Budget {
    fn allocate(&self) -> Option<SectorId> {
        self.left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .ok()?;
        self.inner.allocate()
    }

    fn release(&self, id: SectorId) {
        self.inner.release(id)
    }
}

/// 格式化一块`sectors`个扇区的内存盘
pub fn format(sectors: usize) -> (Arc<RamDisk>, IndexFileSystem) {
    let disk = RamDisk::filled(sectors, 0xA5);
    let fs = IndexFileSystem::format(disk.clone(), sectors as u32).unwrap();
    (disk, fs)
}

/// 可辨认的字节序列
pub fn pattern(len: usize, seed: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + seed * 7) % 251) as u8).collect()
}
