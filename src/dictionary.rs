use std::collections::HashMap;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::model::{Endian, Tag, Vr};

// 标准中的数据元素定义
// 格式: `gggg,eeee<TAB>VR<TAB>名字`，重复组用x表示（比如 `60xx,3000`）
const TAG_MAPPING: &str = include_str!("../data/tag_mapping.txt");

#[derive(Debug, Clone)]
pub struct DictEntry {
    // "US or SS" 这种多个vr的取第一个
    pub vr: Vr,
    pub name: String,
}

struct TagMapping {
    full_match: HashMap<Tag, DictEntry>,
    partial_match: Vec<(Regex, DictEntry)>,
}

lazy_static! {
    static ref MAPPING: TagMapping = load_and_convert_tag_mapping(TAG_MAPPING);
}

fn load_and_convert_tag_mapping(content: &str) -> TagMapping {
    let mut full_match = HashMap::new();
    let mut partial_match = Vec::new();

    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let content_vec = line.split('\t').collect::<Vec<_>>();

        if content_vec.len() != 3 {
            warn!("skipping malformed dictionary line: {:?}", line);
            continue;
        }

        let standard_tag = content_vec[0];
        let vr = content_vec[1].split(" or ").next().and_then(Vr::parse);

        let Some(vr) = vr else {
            warn!("skipping dictionary entry {} with unknown VR {:?}", standard_tag, content_vec[1]);
            continue;
        };

        let entry = DictEntry {
            vr,
            name: content_vec[2].to_string(),
        };

        if standard_tag.contains('x') {
            let pattern = format!("^{}$", standard_tag.replace('x', "[0-9A-F]"));

            match Regex::new(&pattern) {
                Ok(regex) => partial_match.push((regex, entry)),
                Err(e) => warn!("skipping dictionary pattern {}: {}", standard_tag, e),
            }
        } else if let Some(tag) = parse_tag(standard_tag) {
            full_match.insert(tag, entry);
        } else {
            warn!("skipping dictionary entry with invalid tag {:?}", standard_tag);
        }
    }

    TagMapping {
        full_match,
        partial_match,
    }
}

// "0008,0060" -> Tag
pub fn parse_tag(text: &str) -> Option<Tag> {
    let text = text.trim().trim_start_matches('(').trim_end_matches(')');
    let (group, element) = text.split_once(',')?;

    let group = u16::from_str_radix(group.trim(), 16).ok()?;
    let element = u16::from_str_radix(element.trim(), 16).ok()?;

    Some(Tag::new(group, element))
}

pub fn lookup(tag: Tag) -> Option<&'static DictEntry> {
    if let Some(entry) = MAPPING.full_match.get(&tag) {
        return Some(entry);
    }

    let key = format!("{:04X},{:04X}", tag.group, tag.element);

    MAPPING
        .partial_match
        .iter()
        .find(|(regex, _)| regex.is_match(&key))
        .map(|(_, entry)| entry)
}

// 给人看的名字
pub fn tag_name(tag: Tag) -> &'static str {
    if tag == Tag::ITEM {
        return "Item";
    }
    if tag == Tag::ITEM_DELIMITATION {
        return "Item Delimitation Item";
    }
    if tag == Tag::SEQUENCE_DELIMITATION {
        return "Sequence Delimitation Item";
    }

    if let Some(entry) = lookup(tag) {
        return entry.name.as_str();
    }

    if tag.is_group_length() {
        "Group Length"
    } else if tag.is_private_creator() {
        "Private Creator"
    } else if tag.is_private() {
        "Private Tag"
    } else {
        "Unknown"
    }
}

// 隐式vr时用字典推断vr，字典里没有的一律当成UN
pub fn implicit_vr(tag: Tag) -> Vr {
    if tag.is_group_length() {
        return Vr::UL;
    }

    if let Some(entry) = lookup(tag) {
        return entry.vr;
    }

    if tag.is_private_creator() {
        Vr::LO
    } else {
        Vr::UN
    }
}

pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSyntax {
    pub uid: &'static str,
    pub name: &'static str,
    pub explicit_vr: bool,
    pub endian: Endian,
    // 像素数据是封装的（压缩过的片段）
    pub encapsulated: bool,
    // 整个数据集被deflate压缩过
    pub deflated: bool,
}

const fn native(uid: &'static str, name: &'static str, explicit_vr: bool, endian: Endian) -> TransferSyntax {
    TransferSyntax {
        uid,
        name,
        explicit_vr,
        endian,
        encapsulated: false,
        deflated: false,
    }
}

const fn encapsulated(uid: &'static str, name: &'static str) -> TransferSyntax {
    TransferSyntax {
        uid,
        name,
        explicit_vr: true,
        endian: Endian::Little,
        encapsulated: true,
        deflated: false,
    }
}

pub static TRANSFER_SYNTAXES: &[TransferSyntax] = &[
    native(IMPLICIT_VR_LITTLE_ENDIAN, "Implicit VR Little Endian", false, Endian::Little),
    native(EXPLICIT_VR_LITTLE_ENDIAN, "Explicit VR Little Endian", true, Endian::Little),
    TransferSyntax {
        uid: DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN,
        name: "Deflated Explicit VR Little Endian",
        explicit_vr: true,
        endian: Endian::Little,
        encapsulated: false,
        deflated: true,
    },
    native(EXPLICIT_VR_BIG_ENDIAN, "Explicit VR Big Endian", true, Endian::Big),
    encapsulated("1.2.840.10008.1.2.4.50", "JPEG Baseline (Process 1)"),
    encapsulated("1.2.840.10008.1.2.4.51", "JPEG Extended (Process 2 & 4)"),
    encapsulated("1.2.840.10008.1.2.4.57", "JPEG Lossless, Non-Hierarchical (Process 14)"),
    encapsulated("1.2.840.10008.1.2.4.70", "JPEG Lossless, Non-Hierarchical, First-Order Prediction"),
    encapsulated("1.2.840.10008.1.2.4.80", "JPEG-LS Lossless Image Compression"),
    encapsulated("1.2.840.10008.1.2.4.81", "JPEG-LS Lossy (Near-Lossless) Image Compression"),
    encapsulated("1.2.840.10008.1.2.4.90", "JPEG 2000 Image Compression (Lossless Only)"),
    encapsulated("1.2.840.10008.1.2.4.91", "JPEG 2000 Image Compression"),
    encapsulated("1.2.840.10008.1.2.4.100", "MPEG2 Main Profile / Main Level"),
    encapsulated("1.2.840.10008.1.2.4.102", "MPEG-4 AVC/H.264 High Profile / Level 4.1"),
    encapsulated("1.2.840.10008.1.2.4.201", "High-Throughput JPEG 2000 Image Compression (Lossless Only)"),
    encapsulated("1.2.840.10008.1.2.5", "RLE Lossless"),
];

pub fn transfer_syntax(uid: &str) -> Option<&'static TransferSyntax> {
    let uid = uid.trim_end_matches(['\0', ' ']);
    TRANSFER_SYNTAXES.iter().find(|ts| ts.uid == uid)
}

pub fn default_transfer_syntax() -> &'static TransferSyntax {
    &TRANSFER_SYNTAXES[1]
}
