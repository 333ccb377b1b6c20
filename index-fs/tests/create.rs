mod common;

use common::{Budget, format};
use index_fs::{DiskInodeKind, Error, InodeTable, MAX_FILE_SIZE, SECTOR_SIZE, SectorAllocator};

#[test]
fn empty_file_holds_one_zeroed_sector() {
    let (disk, fs) = format(1024);
    let free = fs.free_map().free_count();

    let sector = fs.create_inode(0, DiskInodeKind::File).unwrap();
    // 记录扇区 + 一个数据块
    assert_eq!(free - 2, fs.free_map().free_count());

    let inode = fs.open(sector).unwrap();
    assert_eq!(0, inode.length());
    assert!(!inode.is_dir());

    let data = inode.sector_of(0).unwrap();
    assert_ne!(sector, data);
    assert_eq!([0; SECTOR_SIZE], disk.sector(data));
    assert_eq!(None, inode.sector_of(1));

    let mut buf = [1u8; 16];
    assert_eq!(0, inode.read_at(0, &mut buf));
    assert_eq!(1, inode.stat().blocks);
    fs.close(inode);
}

#[test]
fn created_file_reads_back_zeros() {
    let (_, fs) = format(4096);
    // 越过直接索引，落进一级索引
    let length = 150 * SECTOR_SIZE + 77;
    let sector = fs.create_inode(length, DiskInodeKind::File).unwrap();

    let inode = fs.open(sector).unwrap();
    assert_eq!(length, inode.length());

    let mut buf = vec![0xFF; length + 100];
    assert_eq!(length, inode.read_at(0, &mut buf));
    assert!(buf[..length].iter().all(|&b| b == 0));
    assert!(buf[length..].iter().all(|&b| b == 0xFF));

    // 151 个数据块 + 1 个一级索引块
    assert_eq!(152, inode.stat().blocks);
    fs.close(inode);
}

#[test]
fn create_fills_every_region() {
    let (_, fs) = format(8192);
    let free = fs.free_map().free_count();

    let length = 3173 * SECTOR_SIZE;
    let sector = fs.create_inode(length, DiskInodeKind::File).unwrap();
    // 记录 + 数据块 + 24 个一级索引块 + 二级索引块及其下的一个一级索引块
    assert_eq!(free - (1 + 3173 + 24 + 2), fs.free_map().free_count());

    let inode = fs.open(sector).unwrap();
    let last = inode.sector_of(length - 1).unwrap();
    let mut buf = [0xFF; SECTOR_SIZE];
    assert_eq!(SECTOR_SIZE, inode.read_at(length - SECTOR_SIZE, &mut buf));
    assert_eq!([0; SECTOR_SIZE], buf);
    assert_ne!(inode.sector_of(length - SECTOR_SIZE - 1), Some(last));
    fs.close(inode);
}

#[test]
fn failed_create_leaks_nothing() {
    let (disk, fs) = format(1024);
    let budget = Budget::new(fs.free_map().clone(), 50);
    let inodes = InodeTable::new(disk.clone(), budget);

    let sector = fs.free_map().allocate().unwrap();
    let free = fs.free_map().free_count();

    assert_eq!(
        Err(Error::NoSpace),
        inodes.create(sector, 200 * SECTOR_SIZE, DiskInodeKind::File)
    );
    assert_eq!(free, fs.free_map().free_count());
    // 记录没有落盘
    assert_eq!(Error::BadMagic(sector), inodes.open(sector).unwrap_err());
}

#[test]
fn create_inode_returns_record_sector_on_failure() {
    let (_, fs) = format(64);
    let free = fs.free_map().free_count();

    assert_eq!(
        Err(Error::NoSpace),
        fs.create_inode(100 * SECTOR_SIZE, DiskInodeKind::File)
    );
    assert_eq!(free, fs.free_map().free_count());

    assert_eq!(
        Err(Error::TooLarge(MAX_FILE_SIZE + 1)),
        fs.create_inode(MAX_FILE_SIZE + 1, DiskInodeKind::File)
    );
    assert_eq!(free, fs.free_map().free_count());
}

#[test]
fn directory_kind_is_kept() {
    let (_, fs) = format(256);
    let sector = fs.create_inode(3 * SECTOR_SIZE, DiskInodeKind::Directory).unwrap();

    let inode = fs.open(sector).unwrap();
    assert!(inode.is_dir());
    assert_eq!(sector, inode.inumber());
    assert_eq!(sector.raw() as u64, inode.stat().inode);
    fs.close(inode);
}
