use std::env;

use dicom_stream::{dictionary, util, DicomValue, ParseOptions, Token};

pub type CommonError = Box<dyn std::error::Error>;
pub type CommonResult<T> = std::result::Result<T, CommonError>;

// 超过这个数量的值只显示前面一部分
const MAX_SHOWN_VALUES: usize = 8;

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <path-to-dicom-file> [--no-items] [--no-group-length] [--lazy-threshold <BYTES>]",
        program
    );
    std::process::exit(1);
}

fn parse_args(args: &[String]) -> (String, ParseOptions) {
    let program = args.first().map(|s| s.as_str()).unwrap_or("dicom_stream");

    let mut file_path = None;
    let mut options = ParseOptions::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--no-items" => options.emit_item_elements = false,
            "--no-group-length" => options.emit_group_length = false,
            "--lazy-threshold" => match iter.next().and_then(|v| v.parse::<u32>().ok()) {
                Some(threshold) => options.lazy_threshold = threshold,
                None => {
                    eprintln!("ERROR: --lazy-threshold requires a byte count.");
                    usage(program);
                }
            },
            _ if file_path.is_none() && !arg.starts_with("--") => file_path = Some(arg.clone()),
            _ => usage(program),
        }
    }

    match file_path {
        Some(file_path) => (file_path, options),
        None => usage(program),
    }
}

fn describe_value(value: &DicomValue) -> String {
    fn shown<T: std::fmt::Debug>(values: &[T]) -> String {
        if values.len() > MAX_SHOWN_VALUES {
            format!("{:?}... ({} values)", &values[..MAX_SHOWN_VALUES], values.len())
        } else {
            format!("{:?}", values)
        }
    }

    match value {
        DicomValue::Empty => String::new(),
        DicomValue::Strings(v) => shown(v),
        DicomValue::String(v) => format!("{:?}", v),
        DicomValue::U16(v) => shown(v),
        DicomValue::I16(v) => shown(v),
        DicomValue::U32(v) => shown(v),
        DicomValue::I32(v) => shown(v),
        DicomValue::U64(v) => shown(v),
        DicomValue::I64(v) => shown(v),
        DicomValue::Float(v) => shown(v),
        DicomValue::Double(v) => shown(v),
        DicomValue::Tags(v) => v.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("\\"),
        DicomValue::Bytes(v) if v.len() > MAX_SHOWN_VALUES => {
            format!("{}... ({} bytes)", util::process_vec_to_hex(&v[..MAX_SHOWN_VALUES]), v.len())
        }
        DicomValue::Bytes(v) => util::process_vec_to_hex(v),
        DicomValue::Lazy(lazy) => format!("<deferred {} bytes at offset {}>", lazy.length, lazy.offset),
    }
}

fn main() -> CommonResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let (file_path, options) = parse_args(&args);

    let stream = dicom_stream::parse_file(&file_path, options)?;

    // 当前嵌套的层数，用来缩进
    let mut depth = 0usize;

    for token in stream {
        let indent = "  ".repeat(depth);

        match token? {
            Token::Preamble(bytes) => println!("preamble: {} bytes", bytes.len()),
            Token::Prefix => println!("prefix: DICM"),
            Token::Element(element) => {
                let vr = element.vr.map(|vr| vr.as_str()).unwrap_or("--");
                println!(
                    "{}{} {} {} {}",
                    indent,
                    element.tag,
                    vr,
                    dictionary::tag_name(element.tag),
                    describe_value(&element.data)
                );
            }
            Token::SequenceBegin(path) => {
                println!("{}begin sequence {}", indent, path);
                depth += 1;
            }
            Token::ItemBegin { path, length } => {
                match length {
                    Some(length) => println!("{}begin item {} ({} bytes)", indent, path, length),
                    None => println!("{}begin item {} (undefined length)", indent, path),
                }
                depth += 1;
            }
            Token::ItemEnd(path) => {
                depth = depth.saturating_sub(1);
                println!("{}end item {}", "  ".repeat(depth), path);
            }
            Token::SequenceEnd(path) => {
                depth = depth.saturating_sub(1);
                println!("{}end sequence {}", "  ".repeat(depth), path);
            }
        }
    }

    Ok(())
}
