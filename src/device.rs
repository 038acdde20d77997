use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
};

use spin::Mutex;

use crate::fs::{
    CommandBlock, ControllerLink, OpCode, Sector, MAX_TRACKS, SECTOR_SIZE, TRACK_SECTORS,
};

// std::fs::File 由 Rust 标准库 std 提供, 可以访问宿主机上的一个文件.
// 我们用一个镜像文件模拟整块磁盘 (64 磁道 x 1024 扇区 x 1024 字节 = 64 MiB),
// 并为它实现 ControllerLink 接口.
// 注意 File 本身仅通过 read/write 接口是不能随机读写的,
// 访问一个特定扇区之前必须先 seek 到它在镜像中的起始位置.

/// 模拟控制器的内部状态: 镜像文件, 加上最近一次 SeekTrack 寻到的磁道.
/// ReadSector/WriteSector 都作用于当前磁道; 尚未寻道时读写被拒绝
struct DiskState {
    image: File,
    track: Option<u32>,
}

pub struct DiskFile {
    state: Mutex<DiskState>,
}

impl DiskFile {
    /// 接管镜像文件并把它撑到整盘大小 (新建的稀疏文件读出来全 0)
    pub fn new(image: File) -> std::io::Result<Self> {
        image.set_len((MAX_TRACKS * TRACK_SECTORS * SECTOR_SIZE) as u64)?;
        Ok(Self {
            state: Mutex::new(DiskState { image, track: None }),
        })
    }

    /// (track, sector) 在镜像文件中的字节偏移
    fn offset(track: u32, sector: u16) -> u64 {
        (track as u64 * TRACK_SECTORS as u64 + sector as u64) * SECTOR_SIZE as u64
    }
}

impl ControllerLink for DiskFile {
    fn submit(&self, cmd: u64, buf: Option<&mut Sector>) -> u64 {
        // 无法拆包的命令字原样回显; 其 result 位为 0, 调用者视同失败
        let Some(request) = CommandBlock::unpack(cmd) else {
            return cmd;
        };
        let mut state = self.state.lock();
        let ok = match request.opcode {
            OpCode::Mount => true,
            OpCode::Unmount => state.image.sync_all().is_ok(),
            OpCode::SeekTrack => {
                if (request.track as usize) < MAX_TRACKS {
                    state.track = Some(request.track);
                    true
                } else {
                    false
                }
            }
            OpCode::ReadSector => match (state.track, buf) {
                (Some(track), Some(buf)) if (request.sector as usize) < TRACK_SECTORS => {
                    let off = Self::offset(track, request.sector);
                    state
                        .image
                        .seek(SeekFrom::Start(off))
                        .expect("Error when seeking!");
                    state.image.read_exact(buf).is_ok()
                }
                _ => false,
            },
            OpCode::WriteSector => match (state.track, buf) {
                (Some(track), Some(buf)) if (request.sector as usize) < TRACK_SECTORS => {
                    let off = Self::offset(track, request.sector);
                    state
                        .image
                        .seek(SeekFrom::Start(off))
                        .expect("Error when seeking!");
                    state.image.write_all(buf).is_ok()
                }
                _ => false,
            },
        };
        CommandBlock {
            result: ok,
            ..request
        }
        .pack()
    }
}
