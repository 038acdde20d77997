mod cache;
mod cmd;
mod fs;
mod layout;
mod link;

extern crate log;

use std::fmt;

/// Use a sector size of 1024 bytes
pub const SECTOR_SIZE: usize = 1024;
/// 每条磁道容纳的扇区数
pub const TRACK_SECTORS: usize = 1024;
/// 模拟磁盘的磁道总数
pub const MAX_TRACKS: usize = 64;
/// The max length of a file path
pub const MAX_PATH_LENGTH: usize = 128;
/// 第一个被发放的文件句柄
pub const STARTING_HANDLE: u32 = 5;
/// 默认的扇区缓存容量 (以扇区数计)
pub const DEFAULT_CACHE_SIZE: usize = 8;

/// 翻译层错误分类.
///
/// 句柄/打开状态/范围检查都在本层完成并以错误值返回;
/// Controller 表示模拟设备拒绝了一次操作, 本层不做重试;
/// NoSpace (扇区目录耗尽) 不可恢复, 调用者不应继续写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 句柄从未被发放过
    InvalidHandle,
    /// 文件处于关闭状态
    NotOpen,
    /// seek 目标不在既有内容之内
    OutOfRange,
    /// 路径名超过长度上限
    InvalidPath,
    /// 扇区目录已全部分配
    NoSpace,
    /// 控制器应答携带失败标志
    Controller,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::InvalidHandle => "invalid file handle",
            FsError::NotOpen => "file is not open",
            FsError::OutOfRange => "seek target is past end of file",
            FsError::InvalidPath => "path name too long",
            FsError::NoSpace => "sector directory exhausted",
            FsError::Controller => "controller rejected the operation",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for FsError {}

pub use cache::{CacheMetrics, SectorCache};
pub use cmd::{CommandBlock, OpCode};
pub use fs::FileSystem;
pub use layout::{File, SectorDirectory, SectorId};
pub use link::{ControllerLink, Sector};
