//! 文件翻译层: 把 路径 + 字节偏移 的逻辑文件访问翻译成对模拟控制器的
//! (track, sector) 操作.
//!
//! [`FileSystem`] 独占持有文件表, 扇区目录, 句柄计数器和扇区缓存;
//! 所有操作都要经过同一个实例完成, 没有全局单例,
//! 因此多个互不相干的会话可以各自持有一个实例共存.
//!
//! 读和写都以迭代方式按扇区推进: 每一轮先算出本扇区内还能处理多少字节
//! (不越过扇区边界, 读还不越过文件长度), 处理完推进位置,
//! 再进入下一个扇区, 直到请求满足或到达文件末尾.
//! 这样 剩余字节 的账目清晰, 也不会在很大的请求上堆出深递归.

use std::sync::Arc;

use log::{error, warn};

use super::{
    cache::{CacheMetrics, SectorCache},
    cmd::{CommandBlock, OpCode},
    layout::{File, SectorDirectory, SectorId},
    link::{ControllerLink, Sector},
    FsError, MAX_PATH_LENGTH, SECTOR_SIZE, STARTING_HANDLE,
};

pub struct FileSystem {
    /// 保留控制器链路的一个指针, 所有设备往返都经过它
    link: Arc<dyn ControllerLink>,
    cache: SectorCache,
    /// 文件表; 下标为 handle - STARTING_HANDLE
    files: Vec<File>,
    directory: SectorDirectory,
    /// 下一个待发放的句柄
    next_handle: u32,
}

impl FileSystem {
    /// 建立一个尚未挂载的翻译层实例. cache_capacity 以扇区数计.
    /// 缓存在这里建立一次, 跨越 mount 存活:
    /// 设备内容不随重新挂载复位, 缓存里的扇区仍是设备最后确认过的内容
    pub fn new(link: Arc<dyn ControllerLink>, cache_capacity: usize) -> Self {
        Self {
            link,
            cache: SectorCache::new(cache_capacity),
            files: Vec::new(),
            directory: SectorDirectory::new(),
            next_handle: STARTING_HANDLE,
        }
    }

    /// 挂载: 清空内存状态后向控制器发送 Mount.
    /// 任何文件操作之前必须先挂载; 重复挂载会丢弃此前的文件元数据
    /// (设备本身是否复位是控制器一侧的事)
    pub fn mount(&mut self) -> Result<(), FsError> {
        self.files.clear();
        self.directory.clear();
        self.next_handle = STARTING_HANDLE;
        self.roundtrip(CommandBlock::request(OpCode::Mount, 0, 0), None)?;
        Ok(())
    }

    /// 卸载: 释放文件表后向控制器发送 Unmount. 此后的操作未定义
    pub fn unmount(&mut self) -> Result<(), FsError> {
        self.files = Vec::new();
        self.roundtrip(CommandBlock::request(OpCode::Unmount, 0, 0), None)?;
        Ok(())
    }

    /// 打开文件并返回句柄.
    ///
    /// 已知路径返回原句柄: 已关闭的文件重新打开, 位置回到 0;
    /// 仍然打开的文件保持原状, 只记一条警告, 不算错误.
    /// 新路径则发放下一个句柄 (长度 0, 位置 0), 并立即占用下一个目录槽位
    pub fn open(&mut self, path: &str) -> Result<u32, FsError> {
        if path.len() > MAX_PATH_LENGTH {
            return Err(FsError::InvalidPath);
        }
        if let Some(file) = self.files.iter_mut().find(|f| f.path == path) {
            if file.open {
                warn!("file {} is already open", path);
            } else {
                file.open = true;
                file.pos = 0;
            }
            return Ok(file.handle);
        }
        let handle = self.next_handle;
        let first = self.directory.assign(handle)?;
        self.next_handle += 1;
        self.files.push(File::new(path, handle, first));
        Ok(handle)
    }

    /// 关闭文件. 句柄无效或文件本就关闭时报错
    pub fn close(&mut self, handle: u32) -> Result<(), FsError> {
        let file = self.lookup_mut(handle)?;
        if !file.open {
            return Err(FsError::NotOpen);
        }
        file.open = false;
        Ok(())
    }

    /// 把当前位置移动到 offset.
    /// 只允许落在既有内容之内: offset 必须严格小于文件长度
    pub fn seek(&mut self, handle: u32, offset: usize) -> Result<(), FsError> {
        let file = self.lookup_mut(handle)?;
        if !file.open {
            return Err(FsError::NotOpen);
        }
        if offset >= file.length {
            return Err(FsError::OutOfRange);
        }
        file.pos = offset;
        Ok(())
    }

    /// 从当前位置读至多 buf.len() 个字节, 返回实际读到的字节数.
    ///
    /// 每个扇区先查缓存; 未命中时经控制器寻道加读扇区取回,
    /// 并把整个扇区装进缓存, 再把请求的字节段拷给调用者.
    /// 到达文件末尾时做短读; 位置已在末尾或 buf 为空时返回 0, 不算错误
    pub fn read(&mut self, handle: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let idx = self.index_of(handle)?;
        if !self.files[idx].open {
            return Err(FsError::NotOpen);
        }
        let mut total = 0;
        while total < buf.len() {
            let (pos, length) = {
                let file = &self.files[idx];
                (file.pos, file.length)
            };
            if pos >= length {
                break;
            }
            let (id, in_sector) = self.files[idx].locate(pos);
            // 本轮能读多少: 不越过扇区边界, 也不越过文件长度
            let n = (buf.len() - total)
                .min(SECTOR_SIZE - in_sector)
                .min(length - pos);
            let content = match self.cache.get(id.track, id.sector).copied() {
                Some(content) => content,
                None => {
                    let mut fresh = [0u8; SECTOR_SIZE];
                    self.fetch(id, &mut fresh)?;
                    self.cache.put(id.track, id.sector, &fresh);
                    fresh
                }
            };
            buf[total..total + n].copy_from_slice(&content[in_sector..in_sector + n]);
            self.files[idx].pos += n;
            total += n;
        }
        Ok(total)
    }

    /// 从当前位置写入 buf 的全部内容, 返回写入的字节数.
    ///
    /// 每个被触及的扇区都走 读-合并-写 路径: 先取该扇区现有内容
    /// (命中用缓存, 未命中经控制器读取), 在扇区内偏移处覆盖新字节,
    /// 写回控制器; 控制器确认之后才把合并后的内容装入缓存,
    /// 缓存因此始终与设备最后确认过的内容一致 (写穿).
    /// 写越过原长度时扩展文件长度;
    /// 首次触及尚无槽位的扇区下标时分配下一个目录槽位
    pub fn write(&mut self, handle: u32, buf: &[u8]) -> Result<usize, FsError> {
        let idx = self.index_of(handle)?;
        if !self.files[idx].open {
            return Err(FsError::NotOpen);
        }
        let mut total = 0;
        while total < buf.len() {
            let pos = self.files[idx].pos;
            let in_sector = pos % SECTOR_SIZE;
            let n = (buf.len() - total).min(SECTOR_SIZE - in_sector);
            if pos / SECTOR_SIZE == self.files[idx].sectors.len() {
                // 写入越过了最后一个已分配扇区的边界
                let id = self.directory.assign(handle)?;
                self.files[idx].sectors.push(id);
            }
            let (id, _) = self.files[idx].locate(pos);
            let mut content = match self.cache.get(id.track, id.sector).copied() {
                Some(content) => content,
                None => {
                    let mut fresh = [0u8; SECTOR_SIZE];
                    self.fetch(id, &mut fresh)?;
                    fresh
                }
            };
            content[in_sector..in_sector + n].copy_from_slice(&buf[total..total + n]);
            self.store(id, &mut content)?;
            self.cache.put(id.track, id.sector, &content);
            let file = &mut self.files[idx];
            file.pos += n;
            if file.pos > file.length {
                file.length = file.pos;
            }
            total += n;
        }
        Ok(total)
    }

    /// 缓存累计指标
    pub fn cache_metrics(&self) -> &CacheMetrics {
        self.cache.metrics()
    }

    /// 把缓存指标写进日志
    pub fn log_cache_metrics(&self) {
        self.cache.log_metrics();
    }

    fn index_of(&self, handle: u32) -> Result<usize, FsError> {
        if handle < STARTING_HANDLE || handle >= self.next_handle {
            return Err(FsError::InvalidHandle);
        }
        Ok((handle - STARTING_HANDLE) as usize)
    }

    fn lookup_mut(&mut self, handle: u32) -> Result<&mut File, FsError> {
        let idx = self.index_of(handle)?;
        Ok(&mut self.files[idx])
    }

    /// 未命中路径: 先寻道再读扇区, 两次往返都必须成功
    fn fetch(&self, id: SectorId, content: &mut Sector) -> Result<(), FsError> {
        self.roundtrip(CommandBlock::request(OpCode::SeekTrack, 0, id.track), None)?;
        self.roundtrip(
            CommandBlock::request(OpCode::ReadSector, id.sector, 0),
            Some(content),
        )?;
        Ok(())
    }

    /// 写扇区: 先寻道, 再携带合并后的内容发 WriteSector
    fn store(&self, id: SectorId, content: &mut Sector) -> Result<(), FsError> {
        self.roundtrip(CommandBlock::request(OpCode::SeekTrack, 0, id.track), None)?;
        self.roundtrip(
            CommandBlock::request(OpCode::WriteSector, id.sector, 0),
            Some(content),
        )?;
        Ok(())
    }

    /// 一次控制器往返: 提交命令字, 拆包应答并检查成败标志.
    /// 失败会被记录并上报, 本层不做重试;
    /// 多扇区操作中间的一次失败就让整个调用以失败告终
    fn roundtrip(
        &self,
        request: CommandBlock,
        buf: Option<&mut Sector>,
    ) -> Result<CommandBlock, FsError> {
        let response = self.link.submit(request.pack(), buf);
        match CommandBlock::unpack(response) {
            Some(block) if block.result => Ok(block),
            Some(block) => {
                error!(
                    "controller rejected {:?} (track {}, sector {})",
                    block.opcode, block.track, block.sector
                );
                Err(FsError::Controller)
            }
            None => {
                error!("controller returned a malformed completion word: {:#018x}", response);
                Err(FsError::Controller)
            }
        }
    }
}
