//! # 磁盘数据结构层
//!
//! index-fs 的磁盘布局：
//! 超级块 | 空闲位图 | 根目录 inode | 数据区（inode 记录、数据块、索引块混合分配）

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, DiskInodeKind, MAX_FILE_SIZE};

#[cfg(test)]
mod tests {
    use core::mem;

    use super::SuperBlock;
    use crate::SECTOR_SIZE;

    #[test]
    fn layout() {
        assert_eq!(SECTOR_SIZE, mem::size_of::<SuperBlock>());
    }
}
