use std::{
    fs::{read_dir, File, OpenOptions},
    io::Read,
    sync::Arc,
};

use clap::{Arg, Command};
use log::{info, LevelFilter};

use device::DiskFile;
use fs::{FileSystem, DEFAULT_CACHE_SIZE};

mod device;
mod fs;
#[cfg(test)]
mod test;

/// 极简的日志实现: 加时间戳后直接打到标准输出
struct SimLogger;

impl log::Log for SimLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            println!(
                "[{}] {:5} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: SimLogger = SimLogger;

fn main() {
    log::set_logger(&LOGGER).expect("logger already installed");
    log::set_max_level(LevelFilter::Info);
    pack_and_verify().expect("Error when driving sector fs");
}

fn pack_and_verify() -> Result<(), Box<dyn std::error::Error>> {
    // 从命令行参数取源目录, 镜像路径和缓存容量
    let matches = Command::new("sector-fs")
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .required(true)
                .help("Directory of files to copy into the filesystem"),
        )
        .arg(
            Arg::new("image")
                .short('i')
                .long("image")
                .default_value("target/disk.img")
                .help("Path of the disk image backing the simulated controller"),
        )
        .arg(
            Arg::new("cache")
                .short('c')
                .long("cache")
                .value_parser(clap::value_parser!(usize))
                .help("Cache size, in number of sectors"),
        )
        .get_matches();

    let src_path = matches.get_one::<String>("source").unwrap();
    let image_path = matches.get_one::<String>("image").unwrap();
    let cache_size = matches
        .get_one::<usize>("cache")
        .copied()
        .unwrap_or(DEFAULT_CACHE_SIZE);

    // 打开(或创建)虚拟磁盘镜像, 交给模拟控制器; 在它之上挂载翻译层
    let image = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(image_path)?;
    let link = Arc::new(DiskFile::new(image)?);
    let mut fs = FileSystem::new(link, cache_size);
    fs.mount()?;

    // 读取源目录下的所有文件名
    let mut names: Vec<String> = Vec::new();
    for dir_entry in read_dir(src_path)? {
        names.push(dir_entry?.file_name().into_string().unwrap());
    }

    for name in &names {
        // 从宿主机文件系统读入整个文件
        let mut host_file = File::open(format!("{}/{}", src_path, name))?;
        let mut all_data: Vec<u8> = Vec::new();
        host_file.read_to_end(&mut all_data)?;

        // 写入翻译层
        let handle = fs.open(name)?;
        let written = fs.write(handle, &all_data)?;
        info!("packed {} ({} bytes, handle {})", name, written, handle);

        // 回到文件开头, 读回并逐字节校验
        if !all_data.is_empty() {
            fs.seek(handle, 0)?;
        }
        let mut read_back = vec![0u8; all_data.len()];
        let got = fs.read(handle, &mut read_back)?;
        if got != all_data.len() || read_back != all_data {
            return Err(format!("verify failed for {}", name).into());
        }
        fs.close(handle)?;
    }

    info!(
        "verified {} files, cache hit ratio {:.2}%",
        names.len(),
        fs.cache_metrics().hit_ratio() * 100.0
    );
    fs.log_cache_metrics();
    fs.unmount()?;
    Ok(())
}
