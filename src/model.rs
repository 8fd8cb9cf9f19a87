use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{DicomError, Result};
use crate::path::{ElementPath, ItemPath};
use crate::source::ByteSource;

// 长度字段中的 0xFFFFFFFF，表示长度由后面的分隔符决定
pub const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

// (group, element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE0DD);

    pub const META_GROUP_LENGTH: Tag = Tag::new(0x0002, 0x0000);
    pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);
    pub const SPECIFIC_CHARACTER_SET: Tag = Tag::new(0x0008, 0x0005);
    pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    // group在高16位
    pub const fn composite(&self) -> u32 {
        ((self.group as u32) << 16) | self.element as u32
    }

    pub fn same_as(&self, other: &Tag) -> bool {
        self.group == other.group && self.element == other.element
    }

    // 奇数group是厂商私有的tag
    pub fn is_private(&self) -> bool {
        self.group % 2 == 1
    }

    pub fn is_group_length(&self) -> bool {
        self.element == 0x0000
    }

    pub fn is_private_creator(&self) -> bool {
        self.is_private() && (0x0001..=0x00FF).contains(&self.element)
    }

    // Item / Item Delimitation / Sequence Delimitation 这三个结构性的伪元素
    pub fn is_structural(&self) -> bool {
        *self == Tag::ITEM || *self == Tag::ITEM_DELIMITATION || *self == Tag::SEQUENCE_DELIMITATION
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl From<(u16, u16)> for Tag {
    fn from((group, element): (u16, u16)) -> Self {
        Tag::new(group, element)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vr {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FD,
    FL,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OL,
    OV,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    SV,
    TM,
    UC,
    UI,
    UL,
    UN,
    UR,
    US,
    UT,
    UV,
}

impl Vr {
    pub fn from_bytes(code: [u8; 2]) -> Option<Vr> {
        let vr = match &code {
            b"AE" => Vr::AE,
            b"AS" => Vr::AS,
            b"AT" => Vr::AT,
            b"CS" => Vr::CS,
            b"DA" => Vr::DA,
            b"DS" => Vr::DS,
            b"DT" => Vr::DT,
            b"FD" => Vr::FD,
            b"FL" => Vr::FL,
            b"IS" => Vr::IS,
            b"LO" => Vr::LO,
            b"LT" => Vr::LT,
            b"OB" => Vr::OB,
            b"OD" => Vr::OD,
            b"OF" => Vr::OF,
            b"OL" => Vr::OL,
            b"OV" => Vr::OV,
            b"OW" => Vr::OW,
            b"PN" => Vr::PN,
            b"SH" => Vr::SH,
            b"SL" => Vr::SL,
            b"SQ" => Vr::SQ,
            b"SS" => Vr::SS,
            b"ST" => Vr::ST,
            b"SV" => Vr::SV,
            b"TM" => Vr::TM,
            b"UC" => Vr::UC,
            b"UI" => Vr::UI,
            b"UL" => Vr::UL,
            b"UN" => Vr::UN,
            b"UR" => Vr::UR,
            b"US" => Vr::US,
            b"UT" => Vr::UT,
            b"UV" => Vr::UV,
            _ => return None,
        };

        Some(vr)
    }

    pub fn parse(code: &str) -> Option<Vr> {
        let bytes: [u8; 2] = code.as_bytes().try_into().ok()?;
        Vr::from_bytes(bytes)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vr::AE => "AE",
            Vr::AS => "AS",
            Vr::AT => "AT",
            Vr::CS => "CS",
            Vr::DA => "DA",
            Vr::DS => "DS",
            Vr::DT => "DT",
            Vr::FD => "FD",
            Vr::FL => "FL",
            Vr::IS => "IS",
            Vr::LO => "LO",
            Vr::LT => "LT",
            Vr::OB => "OB",
            Vr::OD => "OD",
            Vr::OF => "OF",
            Vr::OL => "OL",
            Vr::OV => "OV",
            Vr::OW => "OW",
            Vr::PN => "PN",
            Vr::SH => "SH",
            Vr::SL => "SL",
            Vr::SQ => "SQ",
            Vr::SS => "SS",
            Vr::ST => "ST",
            Vr::SV => "SV",
            Vr::TM => "TM",
            Vr::UC => "UC",
            Vr::UI => "UI",
            Vr::UL => "UL",
            Vr::UN => "UN",
            Vr::UR => "UR",
            Vr::US => "US",
            Vr::UT => "UT",
            Vr::UV => "UV",
        }
    }

    // 只有SQ没有自己的值，它的内容是后续的item
    pub fn has_value(&self) -> bool {
        *self != Vr::SQ
    }

    // 显式vr中带2字节预留、4字节长度的那些类型
    pub fn is_unlimited_length(&self) -> bool {
        matches!(
            self,
            Vr::OB
                | Vr::OD
                | Vr::OF
                | Vr::OL
                | Vr::OV
                | Vr::OW
                | Vr::SQ
                | Vr::UC
                | Vr::UN
                | Vr::UR
                | Vr::UT
                | Vr::SV
                | Vr::UV
        )
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn read_u16(&self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn read_u32(&self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }
}

// 延迟读取的值：只记录数据在源中的位置，需要时再去读
// 调用 `realize` 需要拿到源的可变引用，所以不会和正在进行的读取重叠。
// 源被释放之后这个句柄也就没有意义了。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyValue {
    pub offset: u64,
    pub length: u32,
    pub endian: Endian,
}

impl LazyValue {
    // 读取这段数据，读完之后源的位置会恢复到调用前
    pub fn realize<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<Vec<u8>> {
        let saved = source.position();

        let end = self.offset + self.length as u64;
        if end > source.len() {
            return Err(DicomError::ValueIncomplete {
                position: self.offset,
                expected: self.length as u64,
                actual: source.len().saturating_sub(self.offset),
            });
        }

        source.seek(self.offset)?;

        let mut datas = Vec::with_capacity(self.length as usize);
        while datas.len() < self.length as usize {
            match source.read(self.length as usize - datas.len())? {
                Some(chunk) => datas.extend_from_slice(&chunk),
                None => break,
            }
        }

        source.seek(saved)?;

        if datas.len() != self.length as usize {
            return Err(DicomError::ValueIncomplete {
                position: self.offset,
                expected: self.length as u64,
                actual: datas.len() as u64,
            });
        }

        Ok(datas)
    }

    // 按照创建时的字节序把数据解释成16位的字（OW像素数据）
    pub fn realize_words<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<Vec<u16>> {
        let bytes = self.realize(source)?;

        Ok(bytes
            .chunks_exact(2)
            .map(|chunk| self.endian.read_u16(chunk))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DicomValue {
    // SQ和伪元素没有值
    Empty,
    // 多值文本，按反斜杠分割
    Strings(Vec<String>),
    // LT/ST/UT/UR这种单值文本
    String(String),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Tags(Vec<Tag>),
    Bytes(Vec<u8>),
    Lazy(LazyValue),
}

impl DicomValue {
    // 取第一个字符串值，transfer syntax、character set都是这么取的
    pub fn first_str(&self) -> Option<&str> {
        match self {
            DicomValue::Strings(v) => v.first().map(|s| s.as_str()),
            DicomValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn first_u32(&self) -> Option<u32> {
        match self {
            DicomValue::U32(v) => v.first().copied(),
            DicomValue::U16(v) => v.first().map(|v| *v as u32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataElement {
    pub path: ElementPath,
    pub tag: Tag,
    // 伪元素没有vr
    pub vr: Option<Vr>,
    pub length: u32,
    pub data: DicomValue,
}

impl DataElement {
    pub fn is_undefined_length(&self) -> bool {
        self.length == UNDEFINED_LENGTH
    }

    // SQ，或者长度未定义的UN（里面是隐式编码的item）
    pub fn opens_sequence(&self) -> bool {
        match self.vr {
            Some(Vr::SQ) => true,
            Some(Vr::UN) => self.is_undefined_length(),
            _ => false,
        }
    }

    // 长度未定义的OB/OW是封装的像素数据，里面是一个个片段
    pub fn opens_fragments(&self) -> bool {
        matches!(self.vr, Some(Vr::OB) | Some(Vr::OW)) && self.is_undefined_length()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // 128字节的导言
    Preamble(Vec<u8>),
    // DICM
    Prefix,
    Element(DataElement),
    SequenceBegin(ElementPath),
    // length为None表示未定义长度
    ItemBegin {
        path: ItemPath,
        length: Option<u32>,
    },
    ItemEnd(ItemPath),
    SequenceEnd(ElementPath),
}
