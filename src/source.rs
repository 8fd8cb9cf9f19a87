use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{DicomError, Result};

// 源中一段字节的视图，不会拷贝数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

// 单游标的字节源，不能并发使用
pub trait ByteSource {
    fn len(&self) -> u64;

    fn position(&self) -> u64;

    fn eof(&self) -> bool {
        self.position() >= self.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // 最多读取n个字节，只有到了结尾才会少于n，结尾处返回None
    fn read(&mut self, n: usize) -> Result<Option<Vec<u8>>>;

    // 从当前位置开始的一段视图，最多n个字节，不移动位置
    fn slice(&self, n: u64) -> Result<Option<ByteRange>> {
        if n == 0 {
            return Err(DicomError::ArgumentInvalid("slice length must be positive".to_string()));
        }

        if self.eof() {
            return Ok(None);
        }

        let length = n.min(self.len() - self.position());

        Ok(Some(ByteRange {
            offset: self.position(),
            length,
        }))
    }

    fn seek(&mut self, offset: u64) -> Result<()>;

    // 相对移动，结果会被限制在 [0, len] 之间
    fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let target = (self.position() as i128 + delta as i128).clamp(0, self.len() as i128);
        self.seek(target as u64)
    }
}

fn check_read_size(n: usize) -> Result<()> {
    if n == 0 {
        return Err(DicomError::ArgumentInvalid("read size must be positive".to_string()));
    }
    Ok(())
}

fn check_seek_target(offset: u64, len: u64) -> Result<()> {
    if offset > len {
        return Err(DicomError::ArgumentInvalid(format!(
            "seek offset {} is beyond the end of the source ({} bytes)",
            offset, len
        )));
    }
    Ok(())
}

// 内存中的数据
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    position: u64,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, n: usize) -> Result<Option<Vec<u8>>> {
        check_read_size(n)?;

        if self.eof() {
            return Ok(None);
        }

        let start = self.position as usize;
        let end = (start + n).min(self.data.len());

        self.position = end as u64;

        Ok(Some(self.data[start..end].to_vec()))
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        check_seek_target(offset, self.len())?;
        self.position = offset;
        Ok(())
    }
}

// 基于文件的字节源，文件不会被整个读进内存
#[derive(Debug)]
pub struct FileSource {
    reader: BufReader<File>,
    length: u64,
    position: u64,
}

impl FileSource {
    pub fn open(file_path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(file_path.as_ref())?;

        let length = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            length,
            position: 0,
        })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, n: usize) -> Result<Option<Vec<u8>>> {
        check_read_size(n)?;

        if self.eof() {
            return Ok(None);
        }

        let wanted = (n as u64).min(self.length - self.position) as usize;
        let mut buffer = vec![0u8; wanted];
        let filled = fill_buffer(&mut self.reader, &mut buffer, self.position)?;

        buffer.truncate(filled);
        self.position += filled as u64;

        if buffer.is_empty() {
            return Ok(None);
        }

        Ok(Some(buffer))
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        check_seek_target(offset, self.length)?;

        // 同一个位置就不要丢弃缓冲区了
        if offset != self.position {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }

        Ok(())
    }
}

// read可能一次读不满，循环读满为止，被信号打断的就重试。
// 打开时记下了长度，中途读到结尾说明文件被截短了
fn fill_buffer<R: Read>(reader: &mut R, buffer: &mut [u8], position: u64) -> Result<usize> {
    let mut filled = 0;

    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => {
                return Err(DicomError::FileReadAborted {
                    position: position + filled as u64,
                });
            }
            Ok(count) => filled += count,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DicomError::FileReadFailed(e)),
        }
    }

    Ok(filled)
}
