// 流式的DICOM文件解析：不把整个文件读进内存，逐个元素产出token，
// 大的像素数据只记录位置，需要时再读

pub mod dictionary;
pub mod error;
pub mod model;
pub mod path;
pub mod service;
pub mod source;
pub mod stream;
pub mod util;

pub use dictionary::{TransferSyntax, TRANSFER_SYNTAXES};
pub use error::{DicomError, Result};
pub use model::{DataElement, DicomValue, Endian, LazyValue, Tag, Token, Vr, UNDEFINED_LENGTH};
pub use path::{DataSetPath, DicomPath, ElementPath, ItemPath};
pub use service::{ElementReader, Elements, ExplicitVrReader, ImplicitVrReader};
pub use source::{ByteRange, ByteSource, FileSource, MemorySource};
pub use stream::{parse, parse_file, parse_with, DicomStream, ParseOptions, DEFAULT_LAZY_THRESHOLD};
