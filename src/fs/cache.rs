//! 扇区缓存层: 以 (track, sector) 为键, 在内存中缓存最近触碰过的扇区内容.
//!
//! 缓存坐在翻译层和控制器链路之间: 命中一次就省去一次
//! seek-track 加 read-sector 的控制器往返, 这是整条读路径上最大的开销.
//!
//! 容量固定; 放满之后按最久未用淘汰.
//! put 与 get 命中共用同一个单调递增的逻辑时钟来刷新新近度,
//! 因此两类操作之间的新近度次序是全序且一致的,
//! 时钟值最小的存活表项永远是下一个淘汰对象.

use log::info;

use super::link::Sector;

/// 一个缓存表项: 键, 扇区内容, 以及最后一次被触碰时的时钟值
struct CacheEntry {
    track: u32,
    sector: u16,
    content: Sector,
    count: u64,
}

/// 自建立缓存以来的累计计数
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetrics {
    pub inserts: u64,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    /// 命中率; 一次查找都没有发生过时报 0, 不做除零
    pub fn hit_ratio(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

pub struct SectorCache {
    entries: Vec<CacheEntry>,
    capacity: usize,
    /// 共享逻辑时钟, 只增不减
    clock: u64,
    metrics: CacheMetrics,
}

impl SectorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            clock: 0,
            metrics: CacheMetrics::default(),
        }
    }

    /// 取下一个时钟值; 每次 put 和 get 都会经过这里, 无论命中与否
    fn tick(&mut self) -> u64 {
        let next = self.clock;
        self.clock += 1;
        next
    }

    /// 插入或替换 (track, sector) 的表项.
    ///
    /// 键已存在时就地替换内容并刷新新近度;
    /// 容量已满且键不存在时, 先淘汰时钟值最小的表项再插入
    /// (从低下标起扫描, 时钟严格单调保证恰好选出一个牺牲者)
    pub fn put(&mut self, track: u32, sector: u16, content: &Sector) {
        self.metrics.inserts += 1;
        let count = self.tick();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.track == track && e.sector == sector)
        {
            entry.content = *content;
            entry.count = count;
            return;
        }
        // 容量为 0 时只计数, 不驻留任何表项
        if self.capacity == 0 {
            return;
        }
        let entry = CacheEntry {
            track,
            sector,
            content: *content,
            count,
        };
        if self.entries.len() == self.capacity {
            let mut victim = 0;
            for (i, e) in self.entries.iter().enumerate().skip(1) {
                if e.count < self.entries[victim].count {
                    victim = i;
                }
            }
            self.entries[victim] = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// 按键查找. 命中时刷新新近度并返回缓存内容的引用; 未命中返回 None.
    /// 无论结果如何, 每次调用都推进一次共享时钟并计入查找次数
    pub fn get(&mut self, track: u32, sector: u16) -> Option<&Sector> {
        self.metrics.lookups += 1;
        let count = self.tick();
        match self
            .entries
            .iter_mut()
            .find(|e| e.track == track && e.sector == sector)
        {
            Some(entry) => {
                self.metrics.hits += 1;
                entry.count = count;
                Some(&entry.content)
            }
            None => {
                self.metrics.misses += 1;
                None
            }
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// 把累计指标逐行写进日志
    pub fn log_metrics(&self) {
        let m = &self.metrics;
        info!("cache inserts   [{}]", m.inserts);
        info!("cache lookups   [{}]", m.lookups);
        info!("cache hits      [{}]", m.hits);
        info!("cache misses    [{}]", m.misses);
        info!("cache hit ratio [{:.2}%]", m.hit_ratio() * 100.0);
    }
}
