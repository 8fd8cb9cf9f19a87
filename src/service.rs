// 按传输语法逐个读取数据元素
// 显式vr和隐式vr两种读取器共用 ReaderCore，区别只在于vr和长度是怎么得到的。
// 读取器本身不理解嵌套，序列和item的层次由调用方通过 `rebase` 维护。
// 具体的结构参考 https://dicom.nema.org/medical/dicom/current/output/chtml/part05/chapter_7.html

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::Encoding;
use log::{trace, warn};

use crate::error::{DicomError, Result};
use crate::model::{DataElement, DicomValue, Endian, LazyValue, Tag, Vr, UNDEFINED_LENGTH};
use crate::path::DataSetPath;
use crate::source::ByteSource;

// 元素读取器的公共接口
pub trait ElementReader {
    type Source: ByteSource;

    // 读取下一个元素，正好在元素边界上读到结尾时返回None
    fn read_element(&mut self) -> Result<Option<DataElement>>;

    // 之后读到的元素都挂在这个数据集路径下面，不改变读取位置
    fn rebase(&mut self, path: DataSetPath);

    fn core(&self) -> &ReaderCore<Self::Source>;

    fn core_mut(&mut self) -> &mut ReaderCore<Self::Source>;

    fn into_source(self: Box<Self>) -> Self::Source;

    fn base(&self) -> &DataSetPath {
        &self.core().base
    }

    fn position(&self) -> u64 {
        self.core().source.position()
    }

    fn source_mut(&mut self) -> &mut Self::Source {
        &mut self.core_mut().source
    }

    fn encoding(&self) -> &'static Encoding {
        self.core().encoding
    }

    fn set_encoding(&mut self, encoding: &'static Encoding) {
        self.core_mut().encoding = encoding;
    }

    // 在封装像素数据里面时item携带的是片段的字节，而不是嵌套的数据集
    fn set_fragments(&mut self, fragments: bool) {
        self.core_mut().fragments = fragments;
    }

    fn elements(&mut self) -> Elements<'_, Self>
    where
        Self: Sized,
    {
        Elements::new(self)
    }
}

// 把读取器包装成惰性的、不可重启的迭代器，出错之后就不再产出
pub struct Elements<'a, R: ElementReader + ?Sized> {
    reader: &'a mut R,
    finished: bool,
}

impl<'a, R: ElementReader + ?Sized> Elements<'a, R> {
    pub fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }
}

impl<'a, R: ElementReader + ?Sized> Iterator for Elements<'a, R> {
    type Item = Result<DataElement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.read_element() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

// 读取的是哪一部分，用来区分截断错误的种类
#[derive(Debug, Clone, Copy)]
enum Field {
    TagVr,
    ValueLength,
    Value,
}

impl Field {
    fn incomplete(&self, position: u64, expected: u64, actual: u64) -> DicomError {
        match self {
            Field::TagVr => DicomError::TagVrLengthIncomplete {
                position,
                expected,
                actual,
            },
            Field::ValueLength => DicomError::ValueLengthIncomplete {
                position,
                expected,
                actual,
            },
            Field::Value => DicomError::ValueIncomplete {
                position,
                expected,
                actual,
            },
        }
    }
}

// 两种读取器共享的状态和读取逻辑
#[derive(Debug)]
pub struct ReaderCore<S> {
    source: S,
    endian: Endian,
    base: DataSetPath,
    lazy_threshold: u32,
    encoding: &'static Encoding,
    fragments: bool,
}

impl<S: ByteSource> ReaderCore<S> {
    pub fn new(source: S, endian: Endian, lazy_threshold: u32) -> Self {
        Self {
            source,
            endian,
            base: DataSetPath::Root,
            lazy_threshold,
            encoding: crate::util::default_encoding(),
            fragments: false,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    // 读满n个字节，不够的话回到开始的位置并报错
    fn read_exact(&mut self, n: usize, field: Field) -> Result<Vec<u8>> {
        let start = self.source.position();
        // 长度可能是坏的，不要按声明的长度预留内存
        let remaining = self.source.len().saturating_sub(start);
        let mut buffer = Vec::with_capacity((n as u64).min(remaining) as usize);

        while buffer.len() < n {
            match self.source.read(n - buffer.len())? {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => break,
            }
        }

        if buffer.len() < n {
            self.source.seek(start)?;
            return Err(field.incomplete(start, n as u64, buffer.len() as u64));
        }

        Ok(buffer)
    }

    // 结尾处返回None，其他情况必须读满4个字节
    fn read_tag(&mut self) -> Result<Option<Tag>> {
        if self.source.eof() {
            return Ok(None);
        }

        let buffer = self.read_exact(4, Field::TagVr)?;

        // 先group后element，各自按字节序
        let group = self.endian.read_u16(&buffer[0..2]);
        let element = self.endian.read_u16(&buffer[2..4]);

        Ok(Some(Tag::new(group, element)))
    }

    fn read_u16(&mut self, field: Field) -> Result<u16> {
        let buffer = self.read_exact(2, field)?;
        Ok(self.endian.read_u16(&buffer))
    }

    fn read_u32(&mut self, field: Field) -> Result<u32> {
        let buffer = self.read_exact(4, field)?;
        Ok(self.endian.read_u32(&buffer))
    }

    fn read_vr_code(&mut self) -> Result<[u8; 2]> {
        let buffer = self.read_exact(2, Field::TagVr)?;
        Ok([buffer[0], buffer[1]])
    }

    fn skip_reserved(&mut self) -> Result<()> {
        self.read_exact(2, Field::ValueLength)?;
        Ok(())
    }

    // 奇数长度的值后面有一个填充字节
    fn skip_padding(&mut self, length: u32) -> Result<()> {
        if length != UNDEFINED_LENGTH && length % 2 == 1 {
            self.source.seek_relative(1)?;
        }
        Ok(())
    }

    // 超过阈值的大数据只记录位置，直接跳过去
    fn capture_lazy(&mut self, length: u32) -> Result<LazyValue> {
        let start = self.source.position();

        let available = self
            .source
            .slice(length as u64)?
            .map(|range| range.length)
            .unwrap_or(0);

        if available < length as u64 {
            return Err(Field::Value.incomplete(start, length as u64, available));
        }

        let padded = length as u64 + (length as u64 % 2);
        let target = (start + padded).min(self.source.len());
        self.source.seek(target)?;

        Ok(LazyValue {
            offset: start,
            length,
            endian: self.endian,
        })
    }

    fn read_value(&mut self, vr: Vr, length: u32) -> Result<DicomValue> {
        // SQ的内容是后面的item，未定义长度的值由分隔符结束，这里都不读
        if !vr.has_value() || length == UNDEFINED_LENGTH {
            return Ok(DicomValue::Empty);
        }

        if vr.is_unlimited_length() && length > self.lazy_threshold {
            return Ok(DicomValue::Lazy(self.capture_lazy(length)?));
        }

        let buffer = if length == 0 {
            Vec::new()
        } else {
            self.read_exact(length as usize, Field::Value)?
        };

        self.skip_padding(length)?;

        Ok(parse_data(&buffer, vr, self.endian, self.encoding))
    }

    // Item和两个分隔符：没有vr，紧接着4字节长度
    fn finish_structural(&mut self, tag: Tag, position: u64) -> Result<DataElement> {
        let length = self.read_u32(Field::ValueLength)?;

        trace!("{} at {}: structural, length {:#X}", tag, position, length);

        // 封装像素数据里的item本身就是片段数据
        let data = if tag == Tag::ITEM && self.fragments {
            self.read_value(Vr::OB, length)?
        } else {
            DicomValue::Empty
        };

        Ok(DataElement {
            path: self.base.tag(tag),
            tag,
            vr: None,
            length,
            data,
        })
    }

    fn finish(&mut self, tag: Tag, vr: Vr, length: u32, position: u64) -> Result<DataElement> {
        trace!("{} at {}: {} length {:#X}", tag, position, vr, length);

        let data = self.read_value(vr, length)?;

        Ok(DataElement {
            path: self.base.tag(tag),
            tag,
            vr: Some(vr),
            length,
            data,
        })
    }
}

// 解析实际数据，SQ不会走到这里
pub fn parse_data(buffer: &[u8], vr: Vr, endian: Endian, encoding: &'static Encoding) -> DicomValue {
    match vr {
        Vr::AE
        | Vr::AS
        | Vr::CS
        | Vr::DA
        | Vr::DS
        | Vr::DT
        | Vr::IS
        | Vr::LO
        | Vr::PN
        | Vr::SH
        | Vr::TM
        | Vr::UC
        | Vr::UI => {
            let text = crate::util::decode_text(buffer, encoding);
            DicomValue::Strings(crate::util::split_multi_valued(&text))
        }
        Vr::LT | Vr::ST | Vr::UT | Vr::UR => {
            let text = crate::util::decode_text(buffer, encoding);
            DicomValue::String(crate::util::trim_padding(&text).to_string())
        }
        Vr::OB | Vr::OD | Vr::OF | Vr::OL | Vr::OV | Vr::OW | Vr::UN => DicomValue::Bytes(buffer.to_vec()),
        Vr::SQ => DicomValue::Empty,
        _ => match endian {
            Endian::Little => parse_binary::<LittleEndian>(buffer, vr),
            Endian::Big => parse_binary::<BigEndian>(buffer, vr),
        },
    }
}

fn parse_numbers<T>(buffer: &[u8], vr: Vr, size: usize, read: impl Fn(&[u8]) -> T) -> Vec<T> {
    if buffer.len() % size != 0 {
        warn!(
            "{} value of {} bytes is not a multiple of {}, trailing bytes ignored",
            vr,
            buffer.len(),
            size
        );
    }

    buffer.chunks_exact(size).map(read).collect()
}

fn parse_binary<B: ByteOrder>(buffer: &[u8], vr: Vr) -> DicomValue {
    match vr {
        Vr::US => DicomValue::U16(parse_numbers(buffer, vr, 2, B::read_u16)),
        Vr::SS => DicomValue::I16(parse_numbers(buffer, vr, 2, B::read_i16)),
        Vr::UL => DicomValue::U32(parse_numbers(buffer, vr, 4, B::read_u32)),
        Vr::SL => DicomValue::I32(parse_numbers(buffer, vr, 4, B::read_i32)),
        Vr::UV => DicomValue::U64(parse_numbers(buffer, vr, 8, B::read_u64)),
        Vr::SV => DicomValue::I64(parse_numbers(buffer, vr, 8, B::read_i64)),
        Vr::FL => DicomValue::Float(parse_numbers(buffer, vr, 4, B::read_f32)),
        Vr::FD => DicomValue::Double(parse_numbers(buffer, vr, 8, B::read_f64)),
        Vr::AT => DicomValue::Tags(parse_numbers(buffer, vr, 4, |chunk| {
            Tag::new(B::read_u16(&chunk[0..2]), B::read_u16(&chunk[2..4]))
        })),
        _ => DicomValue::Bytes(buffer.to_vec()),
    }
}

// 显式vr：tag之后是两个字符的vr
#[derive(Debug)]
pub struct ExplicitVrReader<S> {
    core: ReaderCore<S>,
}

impl<S: ByteSource> ExplicitVrReader<S> {
    pub fn new(source: S, endian: Endian, lazy_threshold: u32) -> Self {
        Self {
            core: ReaderCore::new(source, endian, lazy_threshold),
        }
    }
}

impl<S: ByteSource> ElementReader for ExplicitVrReader<S> {
    type Source = S;

    fn read_element(&mut self) -> Result<Option<DataElement>> {
        let position = self.core.source.position();

        let Some(tag) = self.core.read_tag()? else {
            return Ok(None);
        };

        if tag.is_structural() {
            return self.core.finish_structural(tag, position).map(Some);
        }

        let code = self.core.read_vr_code()?;

        let Some(vr) = Vr::from_bytes(code) else {
            // 长度按普通结构读掉，然后报错
            self.core.read_u16(Field::ValueLength)?;
            return Err(DicomError::UnsupportedVr {
                vr: String::from_utf8_lossy(&code).into_owned(),
                position,
            });
        };

        let length = if vr.is_unlimited_length() {
            // 显式vr特殊结构：2字节预留，4字节长度
            self.core.skip_reserved()?;
            self.core.read_u32(Field::ValueLength)?
        } else {
            // 显式vr普通结构：2字节长度
            self.core.read_u16(Field::ValueLength)? as u32
        };

        self.core.finish(tag, vr, length, position).map(Some)
    }

    fn rebase(&mut self, path: DataSetPath) {
        self.core.base = path;
    }

    fn core(&self) -> &ReaderCore<S> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ReaderCore<S> {
        &mut self.core
    }

    fn into_source(self: Box<Self>) -> S {
        self.core.source
    }
}

// 隐式vr：vr不在数据里，只能查字典，长度总是4字节
#[derive(Debug)]
pub struct ImplicitVrReader<S> {
    core: ReaderCore<S>,
}

impl<S: ByteSource> ImplicitVrReader<S> {
    // 隐式vr只有小端一种
    pub fn new(source: S, lazy_threshold: u32) -> Self {
        Self {
            core: ReaderCore::new(source, Endian::Little, lazy_threshold),
        }
    }
}

impl<S: ByteSource> ElementReader for ImplicitVrReader<S> {
    type Source = S;

    fn read_element(&mut self) -> Result<Option<DataElement>> {
        let position = self.core.source.position();

        let Some(tag) = self.core.read_tag()? else {
            return Ok(None);
        };

        if tag.is_structural() {
            return self.core.finish_structural(tag, position).map(Some);
        }

        let length = self.core.read_u32(Field::ValueLength)?;

        let mut vr = crate::dictionary::implicit_vr(tag);

        // 未定义长度又不是像素数据的，只能是序列
        if length == UNDEFINED_LENGTH && !matches!(vr, Vr::OB | Vr::OW) {
            vr = Vr::SQ;
        }

        self.core.finish(tag, vr, length, position).map(Some)
    }

    fn rebase(&mut self, path: DataSetPath) {
        self.core.base = path;
    }

    fn core(&self) -> &ReaderCore<S> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ReaderCore<S> {
        &mut self.core
    }

    fn into_source(self: Box<Self>) -> S {
        self.core.source
    }
}
