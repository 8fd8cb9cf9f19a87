// 把整个文件变成一串token
// 先读导言和DICM前缀，再用显式小端读取文件元信息，从里面拿到传输语法之后
// 换成对应的读取器读取数据集。序列和item的层次完全在这里维护，读取器只负责
// 逐个读元素，通过 `rebase` 告诉它当前在哪一层。
// token是按需产生的：调用方不取下一个，就不会去读下一个元素。

use std::collections::VecDeque;
use std::path::Path;

use encoding_rs::Encoding;
use log::{debug, warn};

use crate::dictionary::{self, TransferSyntax};
use crate::error::{DicomError, Result};
use crate::model::{DataElement, DicomValue, Endian, LazyValue, Tag, Token, Vr, UNDEFINED_LENGTH};
use crate::path::{DataSetPath, ElementPath, ItemPath};
use crate::service::{ElementReader, ExplicitVrReader, ImplicitVrReader};
use crate::source::{ByteSource, FileSource};

pub const PREAMBLE_LENGTH: usize = 128;
pub const MAGIC: &[u8; 4] = b"DICM";

// 超过这个长度的大数据（像素等）不会被读进内存
pub const DEFAULT_LAZY_THRESHOLD: u32 = 64 * 1024;

// 默认全部输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    // Item和分隔符这些伪元素是否也作为Element token输出。
    // 序列和item的开始/结束token不受影响
    pub emit_item_elements: bool,
    // (gggg,0000) 是否作为Element token输出，内部仍然会使用它
    pub emit_group_length: bool,
    pub lazy_threshold: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            emit_item_elements: true,
            emit_group_length: true,
            lazy_threshold: DEFAULT_LAZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prefix,
    MetaInfo,
    DataSet,
    Done,
    Failed,
}

// 一个打开的序列
#[derive(Debug)]
struct Frame {
    sequence: ElementPath,
    // 定义了长度的序列在这个位置结束
    end: Option<u64>,
    // 最近的一个item
    item: Option<ItemPath>,
    item_open: bool,
    item_end: Option<u64>,
    // 封装像素数据的片段序列
    fragments: bool,
    // 退出序列后恢复外层数据集的字符集
    encoding: &'static Encoding,
    // 未定义长度的UN里面是隐式小端，结束后换回这个字节序的显式读取器
    restore_explicit: Option<Endian>,
}

type BoxedReader<S> = Box<dyn ElementReader<Source = S>>;

pub struct DicomStream<S: ByteSource + 'static> {
    // 只在切换传输语法的瞬间是None
    reader: Option<BoxedReader<S>>,
    options: ParseOptions,
    phase: Phase,
    pending: VecDeque<Token>,
    meta_end: Option<u64>,
    transfer_syntax_uid: Option<String>,
    transfer_syntax: Option<&'static TransferSyntax>,
    // 当前读取器是不是显式vr
    explicit_vr: bool,
    frames: Vec<Frame>,
}

// 使用默认配置解析
pub fn parse<S: ByteSource + 'static>(source: S) -> DicomStream<S> {
    DicomStream::new(source, ParseOptions::default())
}

pub fn parse_with<S: ByteSource + 'static>(source: S, options: ParseOptions) -> DicomStream<S> {
    DicomStream::new(source, options)
}

pub fn parse_file(file_path: impl AsRef<Path>, options: ParseOptions) -> Result<DicomStream<FileSource>> {
    let source = FileSource::open(file_path)?;
    Ok(DicomStream::new(source, options))
}

impl<S: ByteSource + 'static> DicomStream<S> {
    pub fn new(source: S, options: ParseOptions) -> Self {
        // 文件元信息固定是显式小端
        let reader: BoxedReader<S> = Box::new(ExplicitVrReader::new(source, Endian::Little, options.lazy_threshold));

        Self {
            reader: Some(reader),
            options,
            phase: Phase::Prefix,
            pending: VecDeque::new(),
            meta_end: None,
            transfer_syntax_uid: None,
            transfer_syntax: None,
            explicit_vr: true,
            frames: Vec::new(),
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    // 元信息读完之后才有值
    pub fn transfer_syntax(&self) -> Option<&'static TransferSyntax> {
        self.transfer_syntax
    }

    // 不能叫position，会和Iterator::position冲突
    pub fn byte_position(&self) -> u64 {
        self.reader.as_ref().map(|reader| reader.position()).unwrap_or(0)
    }

    // 读取一个延迟值，读完后源的位置不变，可以继续迭代
    pub fn realize(&mut self, lazy: &LazyValue) -> Result<Vec<u8>> {
        match self.reader.as_mut() {
            Some(reader) => lazy.realize(reader.source_mut()),
            None => Err(DicomError::ArgumentInvalid("the byte source has been released".to_string())),
        }
    }

    // 停止解析，拿回字节源，位置停在最后一个成功读取的字节之后
    pub fn into_source(mut self) -> Option<S> {
        self.reader.take().map(|reader| reader.into_source())
    }

    fn advance(&mut self) -> Result<()> {
        match self.phase {
            Phase::Prefix => self.read_prefix(),
            Phase::MetaInfo => self.step_meta_info(),
            Phase::DataSet => self.step_data_set(),
            Phase::Done | Phase::Failed => Ok(()),
        }
    }

    // 导言128字节 + DICM
    fn read_prefix(&mut self) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            self.phase = Phase::Done;
            return Ok(());
        };

        let source = reader.source_mut();
        let length = PREAMBLE_LENGTH + MAGIC.len();
        let mut buffer = Vec::with_capacity(length);

        while buffer.len() < length {
            match source.read(length - buffer.len())? {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => break,
            }
        }

        if buffer.len() < length || &buffer[PREAMBLE_LENGTH..] != MAGIC {
            return Err(DicomError::PrefixInvalid { position: 0 });
        }

        buffer.truncate(PREAMBLE_LENGTH);

        self.pending.push_back(Token::Preamble(buffer));
        self.pending.push_back(Token::Prefix);
        self.phase = Phase::MetaInfo;

        debug!("preamble and prefix accepted");

        Ok(())
    }

    fn step_meta_info(&mut self) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            self.phase = Phase::Done;
            return Ok(());
        };

        match self.meta_end {
            Some(end) if reader.position() >= end => return self.enter_data_set(),
            Some(_) => {}
            None => {
                if !next_group_is_meta(reader.source_mut())? {
                    return self.enter_data_set();
                }
            }
        }

        let Some(element) = reader.read_element()? else {
            debug!("input ended inside the file meta information");
            self.phase = Phase::Done;
            return Ok(());
        };

        if element.tag == Tag::META_GROUP_LENGTH {
            if let Some(group_length) = element.data.first_u32() {
                // 元信息在这个元素之后再过group_length个字节结束
                self.meta_end = Some(reader.position() + group_length as u64);
            }
        } else if element.tag == Tag::TRANSFER_SYNTAX_UID {
            self.transfer_syntax_uid = element.data.first_str().map(|uid| uid.to_string());
        }

        self.emit_element(element);

        Ok(())
    }

    fn enter_data_set(&mut self) -> Result<()> {
        if self.meta_end.is_none() {
            warn!("file meta information has no group length, ended at the first non-0002 group");
        }

        let transfer_syntax = match self.transfer_syntax_uid.as_deref() {
            Some(uid) => match dictionary::transfer_syntax(uid) {
                Some(ts) => ts,
                None => {
                    warn!("unknown transfer syntax {:?}, reading as explicit VR little endian", uid);
                    dictionary::default_transfer_syntax()
                }
            },
            None => {
                warn!("no transfer syntax declared, reading as explicit VR little endian");
                dictionary::default_transfer_syntax()
            }
        };

        if transfer_syntax.deflated {
            return Err(DicomError::UnsupportedTransferSyntax(transfer_syntax.uid.to_string()));
        }

        let Some(meta_reader) = self.reader.take() else {
            self.phase = Phase::Done;
            return Ok(());
        };

        let source = meta_reader.into_source();
        let threshold = self.options.lazy_threshold;

        let mut reader: BoxedReader<S> = if transfer_syntax.explicit_vr {
            Box::new(ExplicitVrReader::new(source, transfer_syntax.endian, threshold))
        } else {
            Box::new(ImplicitVrReader::new(source, threshold))
        };

        reader.rebase(DataSetPath::Root);

        debug!(
            "data set starts at {} using {} ({})",
            reader.position(),
            transfer_syntax.name,
            transfer_syntax.uid
        );

        self.reader = Some(reader);
        self.transfer_syntax = Some(transfer_syntax);
        self.explicit_vr = transfer_syntax.explicit_vr;
        self.phase = Phase::DataSet;

        Ok(())
    }

    fn step_data_set(&mut self) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            self.phase = Phase::Done;
            return Ok(());
        };

        let Some(element) = reader.read_element()? else {
            self.close_all_frames();
            self.phase = Phase::Done;
            debug!("data set finished at {}", self.byte_position());
            return Ok(());
        };

        let position = reader.position();
        let tag = element.tag;
        let vr = element.vr;
        let length = element.length;
        let path = element.path.clone();
        let opens_sequence = element.opens_sequence();
        let opens_fragments = element.opens_fragments();
        let character_set = if tag == Tag::SPECIFIC_CHARACTER_SET {
            element.data.first_str().map(|term| term.to_string())
        } else {
            None
        };

        // 总是先输出元素本身
        self.emit_element(element);

        if tag == Tag::ITEM {
            self.begin_item(length, position);
        } else if tag == Tag::ITEM_DELIMITATION {
            self.end_item(position);
        } else if tag == Tag::SEQUENCE_DELIMITATION {
            match self.frames.pop() {
                Some(frame) => self.close_frame(frame),
                None => warn!("sequence delimitation outside of a sequence at {}", position),
            }
        } else if opens_sequence || opens_fragments {
            // 显式vr里未定义长度的UN，内容按隐式小端编码
            let implicit_content = vr == Some(Vr::UN) && self.explicit_vr;
            self.begin_sequence(path, length, position, opens_fragments, implicit_content);
        } else if let Some(term) = character_set {
            self.apply_character_set(&term);
        }

        self.close_finished(position);

        Ok(())
    }

    fn emit_element(&mut self, element: DataElement) {
        if element.tag.is_group_length() && !self.options.emit_group_length {
            return;
        }

        // 片段item带着数据，总是输出
        if element.vr.is_none() && element.data == DicomValue::Empty && !self.options.emit_item_elements {
            return;
        }

        self.pending.push_back(Token::Element(element));
    }

    fn begin_sequence(
        &mut self,
        path: ElementPath,
        length: u32,
        position: u64,
        fragments: bool,
        implicit_content: bool,
    ) {
        self.pending.push_back(Token::SequenceBegin(path.clone()));

        let restore_explicit = if implicit_content {
            let endian = self.reader.as_ref().map(|reader| reader.core().endian());
            self.switch_reader(false, Endian::Little);
            endian
        } else {
            None
        };

        let Some(reader) = self.reader.as_mut() else {
            return;
        };

        let end = if length == UNDEFINED_LENGTH {
            None
        } else {
            Some(position + length as u64)
        };

        self.frames.push(Frame {
            sequence: path.clone(),
            end,
            item: None,
            item_open: false,
            item_end: None,
            fragments,
            encoding: reader.encoding(),
            restore_explicit,
        });

        reader.rebase(DataSetPath::Item(path.sequence_item(0)));
        reader.set_fragments(fragments);
    }

    fn begin_item(&mut self, length: u32, position: u64) {
        let Some(frame) = self.frames.last_mut() else {
            warn!("item outside of a sequence at {}", position);
            return;
        };

        // 上一个未定义长度的item没有分隔符就开始了下一个
        if frame.item_open {
            if let Some(previous) = &frame.item {
                warn!("item {} was not delimited", previous);
                self.pending.push_back(Token::ItemEnd(previous.clone()));
            }
        }

        let path = match &frame.item {
            Some(previous) => previous.next(),
            None => frame.sequence.sequence_item(0),
        };

        let declared = if length == UNDEFINED_LENGTH {
            None
        } else {
            Some(length)
        };

        frame.item = Some(path.clone());
        self.pending.push_back(Token::ItemBegin {
            path: path.clone(),
            length: declared,
        });

        if frame.fragments {
            // 片段没有嵌套内容，数据已经在元素里了
            frame.item_open = false;
            frame.item_end = None;
            if let Some(reader) = self.reader.as_mut() {
                reader.rebase(DataSetPath::Item(path.clone()));
            }
            self.pending.push_back(Token::ItemEnd(path));
            return;
        }

        frame.item_open = true;
        frame.item_end = declared.map(|length| position + length as u64);
        let encoding = frame.encoding;

        // 每个item是独立的数据集，从序列外层的字符集开始
        if let Some(reader) = self.reader.as_mut() {
            reader.rebase(DataSetPath::Item(path));
            reader.set_encoding(encoding);
        }
    }

    fn end_item(&mut self, position: u64) {
        let Some(frame) = self.frames.last_mut() else {
            warn!("item delimitation outside of a sequence at {}", position);
            return;
        };

        if !frame.item_open {
            warn!("item delimitation without an open item at {}", position);
            return;
        }

        if let Some(path) = &frame.item {
            self.pending.push_back(Token::ItemEnd(path.clone()));
        }

        frame.item_open = false;
        frame.item_end = None;
        let encoding = frame.encoding;

        if let Some(reader) = self.reader.as_mut() {
            reader.set_encoding(encoding);
        }
    }

    // 输出序列结束，回到序列所在的数据集
    fn close_frame(&mut self, frame: Frame) {
        if frame.item_open {
            if let Some(path) = frame.item {
                self.pending.push_back(Token::ItemEnd(path));
            }
        }

        self.pending.push_back(Token::SequenceEnd(frame.sequence.clone()));

        let fragments = self.frames.last().map(|outer| outer.fragments).unwrap_or(false);

        if let Some(endian) = frame.restore_explicit {
            self.switch_reader(true, endian);
        }

        if let Some(reader) = self.reader.as_mut() {
            reader.rebase(frame.sequence.parent().clone());
            reader.set_encoding(frame.encoding);
            reader.set_fragments(fragments);
        }
    }

    // 定义了长度的item和序列没有分隔符，读到结束位置时补上结束token
    fn close_finished(&mut self, position: u64) {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                break;
            };

            if frame.item_open {
                let item_end = frame.item_end;
                match item_end {
                    Some(end) if position >= end => {
                        if let Some(path) = &frame.item {
                            self.pending.push_back(Token::ItemEnd(path.clone()));
                        }
                        frame.item_open = false;
                        frame.item_end = None;
                        let encoding = frame.encoding;
                        if let Some(reader) = self.reader.as_mut() {
                            reader.set_encoding(encoding);
                        }
                        continue;
                    }
                    _ => break,
                }
            }

            let sequence_end = frame.end;
            match sequence_end {
                Some(end) if position >= end => {
                    if let Some(frame) = self.frames.pop() {
                        self.close_frame(frame);
                    }
                }
                _ => break,
            }
        }
    }

    // 换一种读取器接着读同一个字节源，路径和字符集保持不变
    fn switch_reader(&mut self, explicit_vr: bool, endian: Endian) {
        let Some(current) = self.reader.take() else {
            return;
        };

        let base = current.base().clone();
        let encoding = current.encoding();
        let source = current.into_source();
        let threshold = self.options.lazy_threshold;

        let mut reader: BoxedReader<S> = if explicit_vr {
            Box::new(ExplicitVrReader::new(source, endian, threshold))
        } else {
            Box::new(ImplicitVrReader::new(source, threshold))
        };

        reader.rebase(base);
        reader.set_encoding(encoding);

        debug!(
            "switched to {} VR reader at {}",
            if explicit_vr { "explicit" } else { "implicit" },
            reader.position()
        );

        self.reader = Some(reader);
        self.explicit_vr = explicit_vr;
    }

    fn close_all_frames(&mut self) {
        while let Some(frame) = self.frames.pop() {
            warn!("input ended inside sequence {}", frame.sequence);
            self.close_frame(frame);
        }
    }

    fn apply_character_set(&mut self, term: &str) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };

        match crate::util::encoding_for_character_set(term) {
            Some(encoding) => {
                debug!("specific character set {:?} -> {}", term, encoding.name());
                reader.set_encoding(encoding);
            }
            None => warn!("unsupported specific character set {:?}, keeping {}", term, reader.encoding().name()),
        }
    }
}

// 缺少group length时，看一眼下一个tag的group是不是0002
fn next_group_is_meta<S: ByteSource + ?Sized>(source: &mut S) -> Result<bool> {
    let Some(bytes) = source.read(2)? else {
        return Ok(false);
    };

    source.seek_relative(-(bytes.len() as i64))?;

    Ok(bytes.len() == 2 && u16::from_le_bytes([bytes[0], bytes[1]]) == 0x0002)
}

impl<S: ByteSource + 'static> Iterator for DicomStream<S> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }

            if matches!(self.phase, Phase::Done | Phase::Failed) {
                return None;
            }

            if let Err(e) = self.advance() {
                self.phase = Phase::Failed;
                return Some(Err(e));
            }
        }
    }
}
