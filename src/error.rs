use thiserror::Error;

#[derive(Debug, Error)]
pub enum DicomError {
    // 调用方传入了非法参数（越界的seek，长度为0的read等）
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),

    // 底层文件读取失败
    #[error("file read failed: {0}")]
    FileReadFailed(#[from] std::io::Error),

    // 读取被中断
    #[error("file read aborted at offset {position}")]
    FileReadAborted { position: u64 },

    // 导言或者DICM前缀缺失、过短
    #[error("invalid preamble/prefix at offset {position}")]
    PrefixInvalid { position: u64 },

    #[error("incomplete tag/VR at offset {position}: expected {expected} bytes, got {actual}")]
    TagVrLengthIncomplete {
        position: u64,
        expected: u64,
        actual: u64,
    },

    #[error("incomplete value length at offset {position}: expected {expected} bytes, got {actual}")]
    ValueLengthIncomplete {
        position: u64,
        expected: u64,
        actual: u64,
    },

    #[error("incomplete value at offset {position}: expected {expected} bytes, got {actual}")]
    ValueIncomplete {
        position: u64,
        expected: u64,
        actual: u64,
    },

    // 没有对应解码规则的VR
    #[error("unsupported VR {vr:?} at offset {position}")]
    UnsupportedVr { vr: String, position: u64 },

    #[error("unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),
}

pub type Result<T> = std::result::Result<T, DicomError>;
