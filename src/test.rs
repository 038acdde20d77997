use std::{
    fs::OpenOptions,
    io::{Seek, SeekFrom, Write},
    sync::Arc,
};

use crate::device::DiskFile;
use crate::fs::{FileSystem, FsError, SECTOR_SIZE, STARTING_HANDLE};

/// 在 target/ 下建一个镜像文件, 在其上挂载一个翻译层实例
fn mount_on(image_name: &str, cache_size: usize) -> FileSystem {
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(format!("target/{}", image_name))
        .unwrap();
    let link = Arc::new(DiskFile::new(f).unwrap());
    let mut fs = FileSystem::new(link, cache_size);
    fs.mount().unwrap();
    fs
}

#[test]
fn write_seek_read_round_trip() {
    let mut fs = mount_on("round_trip.img", 8);
    let handle = fs.open("filea").unwrap();
    let greet_str = "Hello, world!";
    assert_eq!(
        fs.write(handle, greet_str.as_bytes()).unwrap(),
        greet_str.len()
    );
    fs.seek(handle, 0).unwrap();
    let mut buffer = [0u8; 233];
    let len = fs.read(handle, &mut buffer).unwrap();
    assert_eq!(greet_str.as_bytes(), &buffer[..len]);
}

#[test]
fn write_across_sector_boundary() {
    let mut fs = mount_on("boundary.img", 8);
    let handle = fs.open("filea").unwrap();
    // 先铺满第一个扇区的前 1000 字节, 再写一段跨越 1024 边界的数据
    fs.write(handle, &[0x11; 1000]).unwrap();
    let spanning: Vec<u8> = (0..100u8).collect();
    assert_eq!(fs.write(handle, &spanning).unwrap(), spanning.len());
    fs.seek(handle, 0).unwrap();
    let mut read_back = vec![0u8; 1100];
    assert_eq!(fs.read(handle, &mut read_back).unwrap(), 1100);
    assert_eq!(&read_back[..1000], &[0x11; 1000][..]);
    assert_eq!(&read_back[1000..], &spanning[..]);
    // 边界两侧的字节各归各位
    assert_eq!(read_back[1023], spanning[23]);
    assert_eq!(read_back[1024], spanning[24]);
}

#[test]
fn multi_sector_random_round_trip() {
    let mut fs = mount_on("random.img", 8);
    let mut round = 0;

    let mut random_round_trip = |fs: &mut FileSystem, len: usize| {
        round += 1;
        // 截断不受支持, 每种长度用一个新文件
        let handle = fs.open(&format!("file{}", round)).unwrap();
        let mut payload: Vec<u8> = Vec::with_capacity(len);
        // random digit
        for _ in 0..len {
            payload.push(b'0' + rand::random::<u8>() % 10);
        }
        assert_eq!(fs.write(handle, &payload).unwrap(), len);
        fs.seek(handle, 0).unwrap();
        let mut read_buffer = [0u8; 127];
        let mut read_back: Vec<u8> = Vec::with_capacity(len);
        loop {
            let n = fs.read(handle, &mut read_buffer).unwrap();
            if n == 0 {
                break;
            }
            read_back.extend_from_slice(&read_buffer[..n]);
        }
        assert_eq!(payload, read_back);
    };

    random_round_trip(&mut fs, 4 * SECTOR_SIZE);
    random_round_trip(&mut fs, 8 * SECTOR_SIZE + SECTOR_SIZE / 2);
    random_round_trip(&mut fs, 70 * SECTOR_SIZE + SECTOR_SIZE / 7);
    random_round_trip(&mut fs, 400 * SECTOR_SIZE);
}

#[test]
fn cache_hit_masks_device_corruption() {
    let mut fs = mount_on("corrupt.img", 8);
    let handle = fs.open("filea").unwrap();
    fs.write(handle, &[0x5a; SECTOR_SIZE]).unwrap();

    // 绕过翻译层, 直接把镜像上的这个扇区改坏
    // (第一个打开的文件占第一个槽位, 即镜像偏移 0 处)
    let mut raw = OpenOptions::new()
        .write(true)
        .open("target/corrupt.img")
        .unwrap();
    raw.seek(SeekFrom::Start(0)).unwrap();
    raw.write_all(&[0xff; SECTOR_SIZE]).unwrap();
    raw.sync_all().unwrap();

    // 该扇区仍驻留缓存: 读到的仍是最后一次确认写入的内容
    fs.seek(handle, 0).unwrap();
    let mut read_back = [0u8; SECTOR_SIZE];
    assert_eq!(fs.read(handle, &mut read_back).unwrap(), SECTOR_SIZE);
    assert_eq!(read_back, [0x5a; SECTOR_SIZE]);

    // 把 8 个别的扇区带进容量为 8 的缓存挤掉它之后, 设备上的破坏才可见
    for i in 0..8 {
        let filler = fs.open(&format!("filler{}", i)).unwrap();
        fs.write(filler, &[0u8; 1]).unwrap();
    }
    fs.seek(handle, 0).unwrap();
    fs.read(handle, &mut read_back).unwrap();
    assert_eq!(read_back, [0xff; SECTOR_SIZE]);
}

#[test]
fn seek_bounds_are_rejected() {
    let mut fs = mount_on("seek.img", 8);
    let handle = fs.open("filea").unwrap();
    fs.write(handle, &[7u8; 100]).unwrap();
    // 允许的目标是 [0, length), 到长度本身或更远都不行
    assert_eq!(fs.seek(handle, 100), Err(FsError::OutOfRange));
    assert_eq!(fs.seek(handle, 101), Err(FsError::OutOfRange));
    assert!(fs.seek(handle, 99).is_ok());
}

#[test]
fn handles_are_unique_and_stable() {
    let mut fs = mount_on("handles.img", 8);
    let a = fs.open("filea").unwrap();
    let b = fs.open("fileb").unwrap();
    assert_eq!(a, STARTING_HANDLE);
    assert_ne!(a, b);
    // 未关闭时重复打开: 同一句柄, 状态不变
    fs.write(a, &[1u8; 10]).unwrap();
    assert_eq!(fs.open("filea").unwrap(), a);
    // 关闭后重新打开: 同一句柄, 位置回到 0
    fs.close(a).unwrap();
    assert_eq!(fs.open("filea").unwrap(), a);
    let mut buf = [0u8; 10];
    assert_eq!(fs.read(a, &mut buf).unwrap(), 10);
    assert_eq!(buf, [1u8; 10]);
}

#[test]
fn operations_need_a_valid_open_handle() {
    let mut fs = mount_on("invalid.img", 8);
    let mut buf = [0u8; 4];
    assert_eq!(
        fs.read(STARTING_HANDLE, &mut buf),
        Err(FsError::InvalidHandle)
    );
    assert_eq!(fs.close(1), Err(FsError::InvalidHandle));
    let handle = fs.open("filea").unwrap();
    fs.close(handle).unwrap();
    assert_eq!(fs.close(handle), Err(FsError::NotOpen));
    assert_eq!(fs.write(handle, &buf), Err(FsError::NotOpen));
    assert_eq!(fs.read(handle, &mut buf), Err(FsError::NotOpen));
    assert_eq!(fs.seek(handle, 0), Err(FsError::NotOpen));
}

#[test]
fn short_and_zero_length_reads() {
    let mut fs = mount_on("short.img", 8);
    let handle = fs.open("filea").unwrap();
    fs.write(handle, &[9u8; 10]).unwrap();
    // 位置已在文件末尾: 读到 0 个字节, 不是错误
    let mut big = [0u8; 64];
    assert_eq!(fs.read(handle, &mut big).unwrap(), 0);
    // 末尾之前的短读: 只返回实际可读的字节数
    fs.seek(handle, 4).unwrap();
    assert_eq!(fs.read(handle, &mut big).unwrap(), 6);
    // 空缓冲区: 同样返回 0
    assert_eq!(fs.read(handle, &mut []).unwrap(), 0);
}

#[test]
fn files_never_share_sectors() {
    let mut fs = mount_on("owners.img", 8);
    let a = fs.open("filea").unwrap();
    let b = fs.open("fileb").unwrap();
    // 交错增长: 两个文件轮流越过扇区边界
    fs.write(a, &vec![1u8; 3 * SECTOR_SIZE]).unwrap();
    fs.write(b, &vec![2u8; 2 * SECTOR_SIZE]).unwrap();
    fs.seek(a, 0).unwrap();
    let mut back = vec![0u8; 3 * SECTOR_SIZE];
    assert_eq!(fs.read(a, &mut back).unwrap(), 3 * SECTOR_SIZE);
    assert!(back.iter().all(|&x| x == 1));
    fs.seek(b, 0).unwrap();
    let mut back = vec![0u8; 2 * SECTOR_SIZE];
    assert_eq!(fs.read(b, &mut back).unwrap(), 2 * SECTOR_SIZE);
    assert!(back.iter().all(|&x| x == 2));
}
