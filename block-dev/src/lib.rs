//! # 块设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备，例如磁盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 驱动不做任何缓冲，每次调用即一次完整的扇区读写。
//! 设备层面的错误对文件系统而言是致命的，驱动直接 panic。

#![no_std]

use core::any::Any;
use core::fmt::Debug;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// 将扇区`block_id`的内容读入`buf`，`buf`恰为一个扇区大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// 将`buf`整个写入扇区`block_id`
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
