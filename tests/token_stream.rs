use std::io::Write;

use dicom_stream::{
    parse, parse_file, parse_with, DicomError, DicomValue, MemorySource, ParseOptions, Tag, Token, Vr,
    UNDEFINED_LENGTH,
};

const EXPLICIT_LE: &str = "1.2.840.10008.1.2.1";
const IMPLICIT_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_BE: &str = "1.2.840.10008.1.2.2";
const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";

const MODALITY: Tag = Tag::new(0x0008, 0x0060);
const PATIENT_NAME: Tag = Tag::new(0x0010, 0x0010);
const PATIENT_SEX: Tag = Tag::new(0x0010, 0x0040);
const REFERENCED_SERIES: Tag = Tag::new(0x0008, 0x1115);
const REFERENCED_IMAGE: Tag = Tag::new(0x0008, 0x1140);
const SOP_INSTANCE: Tag = Tag::new(0x0008, 0x1155);
const ROWS: Tag = Tag::new(0x0028, 0x0010);

fn pad_even(value: &[u8], pad: u8) -> Vec<u8> {
    let mut value = value.to_vec();
    if value.len() % 2 == 1 {
        value.push(pad);
    }
    value
}

fn tag_bytes(tag: Tag, big_endian: bool) -> Vec<u8> {
    if big_endian {
        [tag.group.to_be_bytes(), tag.element.to_be_bytes()].concat()
    } else {
        [tag.group.to_le_bytes(), tag.element.to_le_bytes()].concat()
    }
}

// 显式小端的一个元素
fn explicit(tag: Tag, vr: &str, value: &[u8]) -> Vec<u8> {
    let mut bytes = tag_bytes(tag, false);
    bytes.extend_from_slice(vr.as_bytes());

    if Vr::parse(vr).map(|vr| vr.is_unlimited_length()).unwrap_or(false) {
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        bytes.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }

    bytes.extend_from_slice(value);
    bytes
}

fn explicit_undefined(tag: Tag, vr: &str) -> Vec<u8> {
    let mut bytes = tag_bytes(tag, false);
    bytes.extend_from_slice(vr.as_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
    bytes
}

fn explicit_sequence(tag: Tag, length: u32) -> Vec<u8> {
    let mut bytes = tag_bytes(tag, false);
    bytes.extend_from_slice(b"SQ");
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes
}

fn implicit(tag: Tag, value: &[u8]) -> Vec<u8> {
    let mut bytes = tag_bytes(tag, false);
    bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
    bytes.extend_from_slice(value);
    bytes
}

fn structural(tag: Tag, length: u32) -> Vec<u8> {
    let mut bytes = tag_bytes(tag, false);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes
}

fn item(length: u32) -> Vec<u8> {
    structural(Tag::ITEM, length)
}

fn item_delimitation() -> Vec<u8> {
    structural(Tag::ITEM_DELIMITATION, 0)
}

fn sequence_delimitation() -> Vec<u8> {
    structural(Tag::SEQUENCE_DELIMITATION, 0)
}

// 导言 + DICM + 元信息 + 数据集
fn dicom_file(transfer_syntax: &str, data_set: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 128];
    bytes.extend_from_slice(b"DICM");

    let syntax = explicit(Tag::new(0x0002, 0x0010), "UI", &pad_even(transfer_syntax.as_bytes(), 0));
    bytes.extend(explicit(Tag::new(0x0002, 0x0000), "UL", &(syntax.len() as u32).to_le_bytes()));
    bytes.extend(syntax);

    bytes.extend_from_slice(data_set);
    bytes
}

fn tokens(bytes: Vec<u8>) -> Vec<Token> {
    parse(MemorySource::new(bytes)).collect::<Result<Vec<_>, _>>().unwrap()
}

fn describe(token: &Token) -> String {
    match token {
        Token::Preamble(_) => "preamble".to_string(),
        Token::Prefix => "prefix".to_string(),
        Token::Element(element) => format!("element {}", element.path),
        Token::SequenceBegin(path) => format!("sequence-begin {}", path),
        Token::ItemBegin { path, .. } => format!("item-begin {}", path),
        Token::ItemEnd(path) => format!("item-end {}", path),
        Token::SequenceEnd(path) => format!("sequence-end {}", path),
    }
}

// 只看数据集部分（去掉导言、前缀和两个元信息元素）
fn data_set_descriptions(tokens: &[Token]) -> Vec<String> {
    tokens.iter().skip(4).map(describe).collect()
}

fn assert_balanced(tokens: &[Token]) {
    let mut stack = Vec::new();

    for token in tokens {
        match token {
            Token::SequenceBegin(path) => stack.push(format!("sequence {}", path)),
            Token::ItemBegin { path, .. } => stack.push(format!("item {}", path)),
            Token::SequenceEnd(path) => assert_eq!(stack.pop(), Some(format!("sequence {}", path))),
            Token::ItemEnd(path) => assert_eq!(stack.pop(), Some(format!("item {}", path))),
            _ => {}
        }
    }

    assert!(stack.is_empty(), "unclosed: {:?}", stack);
}

fn elements(tokens: &[Token]) -> Vec<&dicom_stream::DataElement> {
    tokens
        .iter()
        .filter_map(|token| match token {
            Token::Element(element) => Some(element),
            _ => None,
        })
        .collect()
}

#[test]
fn minimal_explicit_little_endian_file() {
    let bytes = dicom_file(EXPLICIT_LE, &explicit(MODALITY, "CS", b"OT"));
    let tokens = tokens(bytes);

    assert_eq!(tokens.len(), 5);
    assert!(matches!(&tokens[0], Token::Preamble(preamble) if preamble == &vec![0u8; 128]));
    assert_eq!(tokens[1], Token::Prefix);

    let elements = elements(&tokens);
    assert_eq!(elements[0].tag, Tag::new(0x0002, 0x0000));
    assert_eq!(elements[0].data, DicomValue::U32(vec![28]));
    assert_eq!(elements[1].tag, Tag::new(0x0002, 0x0010));
    assert_eq!(elements[1].data, DicomValue::Strings(vec![EXPLICIT_LE.to_string()]));
    assert_eq!(elements[2].tag, MODALITY);
    assert_eq!(elements[2].data, DicomValue::Strings(vec!["OT".to_string()]));

    assert!(!tokens.iter().any(|token| matches!(
        token,
        Token::SequenceBegin(_) | Token::SequenceEnd(_) | Token::ItemBegin { .. } | Token::ItemEnd(_)
    )));
}

#[test]
fn truncated_prefix_yields_no_tokens() {
    let mut stream = parse(MemorySource::new(vec![0u8; 131]));

    match stream.next() {
        Some(Err(DicomError::PrefixInvalid { position })) => assert_eq!(position, 0),
        other => panic!("expected PrefixInvalid, got {:?}", other),
    }
    assert!(stream.next().is_none());
}

#[test]
fn sequence_with_two_delimited_items() {
    let mut data_set = explicit_undefined(REFERENCED_SERIES, "SQ");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(SOP_INSTANCE, "UI", b"1.2.3.4\0"));
    data_set.extend(item_delimitation());
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(SOP_INSTANCE, "UI", b"1.2.3.5\0"));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());
    data_set.extend(explicit(PATIENT_SEX, "CS", b"F "));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));

    assert_eq!(
        data_set_descriptions(&tokens),
        vec![
            "element (0008,1115)",
            "sequence-begin (0008,1115)",
            "element (0008,1115).#0.(FFFE,E000)",
            "item-begin (0008,1115).#0",
            "element (0008,1115).#0.(0008,1155)",
            "element (0008,1115).#0.(FFFE,E00D)",
            "item-end (0008,1115).#0",
            "element (0008,1115).#0.(FFFE,E000)",
            "item-begin (0008,1115).#1",
            "element (0008,1115).#1.(0008,1155)",
            "element (0008,1115).#1.(FFFE,E00D)",
            "item-end (0008,1115).#1",
            "element (0008,1115).#1.(FFFE,E0DD)",
            "sequence-end (0008,1115)",
            "element (0010,0040)",
        ]
    );
    assert_balanced(&tokens);

    let undefined_items = tokens
        .iter()
        .filter(|token| matches!(token, Token::ItemBegin { length: None, .. }))
        .count();
    assert_eq!(undefined_items, 2);
}

#[test]
fn structural_elements_can_be_hidden() {
    let mut data_set = explicit_undefined(REFERENCED_SERIES, "SQ");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(SOP_INSTANCE, "UI", b"1.2.3.4\0"));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());

    let options = ParseOptions {
        emit_item_elements: false,
        ..ParseOptions::default()
    };
    let tokens = parse_with(MemorySource::new(dicom_file(EXPLICIT_LE, &data_set)), options)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(
        data_set_descriptions(&tokens),
        vec![
            "element (0008,1115)",
            "sequence-begin (0008,1115)",
            "item-begin (0008,1115).#0",
            "element (0008,1115).#0.(0008,1155)",
            "item-end (0008,1115).#0",
            "sequence-end (0008,1115)",
        ]
    );
}

#[test]
fn group_length_can_be_hidden() {
    let mut data_set = explicit(Tag::new(0x0010, 0x0000), "UL", &8u32.to_le_bytes());
    data_set.extend(explicit(PATIENT_SEX, "CS", b"M "));

    let options = ParseOptions {
        emit_group_length: false,
        ..ParseOptions::default()
    };
    let tokens = parse_with(MemorySource::new(dicom_file(EXPLICIT_LE, &data_set)), options)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let tags = elements(&tokens).iter().map(|element| element.tag).collect::<Vec<_>>();
    assert_eq!(tags, vec![Tag::new(0x0002, 0x0010), PATIENT_SEX]);
}

#[test]
fn defined_length_sequences_are_closed_by_position() {
    let first = explicit(SOP_INSTANCE, "UI", b"1.2.3.4\0");
    let second = explicit(SOP_INSTANCE, "UI", b"1.2.3.5\0");

    let mut items = item(first.len() as u32);
    items.extend(&first);
    items.extend(item(second.len() as u32));
    items.extend(&second);

    let mut data_set = explicit_sequence(REFERENCED_SERIES, items.len() as u32);
    data_set.extend(&items);
    data_set.extend(explicit(PATIENT_SEX, "CS", b"O "));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));

    assert_eq!(
        data_set_descriptions(&tokens),
        vec![
            "element (0008,1115)",
            "sequence-begin (0008,1115)",
            "element (0008,1115).#0.(FFFE,E000)",
            "item-begin (0008,1115).#0",
            "element (0008,1115).#0.(0008,1155)",
            "item-end (0008,1115).#0",
            "element (0008,1115).#0.(FFFE,E000)",
            "item-begin (0008,1115).#1",
            "element (0008,1115).#1.(0008,1155)",
            "item-end (0008,1115).#1",
            "sequence-end (0008,1115)",
            "element (0010,0040)",
        ]
    );
    assert_balanced(&tokens);

    let lengths = tokens
        .iter()
        .filter_map(|token| match token {
            Token::ItemBegin { length, .. } => Some(*length),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(lengths, vec![Some(16), Some(16)]);
}

#[test]
fn empty_sequences_open_and_close() {
    let mut data_set = explicit_sequence(REFERENCED_SERIES, 0);
    data_set.extend(explicit_undefined(REFERENCED_IMAGE, "SQ"));
    data_set.extend(sequence_delimitation());

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));

    assert_eq!(
        data_set_descriptions(&tokens),
        vec![
            "element (0008,1115)",
            "sequence-begin (0008,1115)",
            "sequence-end (0008,1115)",
            "element (0008,1140)",
            "sequence-begin (0008,1140)",
            "element (0008,1140).#0.(FFFE,E0DD)",
            "sequence-end (0008,1140)",
        ]
    );
}

#[test]
fn nested_sequences_stay_balanced() {
    let mut inner = explicit_undefined(REFERENCED_IMAGE, "SQ");
    inner.extend(item(UNDEFINED_LENGTH));
    inner.extend(explicit(SOP_INSTANCE, "UI", b"1.2.3.4\0"));
    inner.extend(item_delimitation());
    inner.extend(sequence_delimitation());

    let mut data_set = explicit_undefined(REFERENCED_SERIES, "SQ");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(&inner);
    data_set.extend(explicit(MODALITY, "CS", b"CT"));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());
    data_set.extend(explicit(PATIENT_SEX, "CS", b"F "));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));
    assert_balanced(&tokens);

    let paths = elements(&tokens)
        .iter()
        .filter(|element| element.vr.is_some())
        .map(|element| element.path.to_string())
        .collect::<Vec<_>>();

    assert!(paths.contains(&"(0008,1115).#0.(0008,1140).#0.(0008,1155)".to_string()));
    assert!(paths.contains(&"(0008,1115).#0.(0008,0060)".to_string()));
    assert_eq!(paths.last(), Some(&"(0010,0040)".to_string()));
}

#[test]
fn implicit_little_endian_data_set() {
    let mut data_set = implicit(MODALITY, b"MR");
    data_set.extend(structural(REFERENCED_SERIES, UNDEFINED_LENGTH));
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(implicit(SOP_INSTANCE, b"1.2.3.4\0"));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());
    data_set.extend(implicit(ROWS, &512u16.to_le_bytes()));
    data_set.extend(implicit(Tag::new(0x0009, 0x1001), &[1, 2, 3, 4]));

    let mut stream = parse(MemorySource::new(dicom_file(IMPLICIT_LE, &data_set)));
    let tokens = stream.by_ref().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(stream.transfer_syntax().map(|ts| ts.uid), Some(IMPLICIT_LE));
    assert_balanced(&tokens);

    let elements = elements(&tokens);
    let modality = elements.iter().find(|element| element.tag == MODALITY).unwrap();
    assert_eq!(modality.vr, Some(Vr::CS));
    assert_eq!(modality.data, DicomValue::Strings(vec!["MR".to_string()]));

    let sequence = elements.iter().find(|element| element.tag == REFERENCED_SERIES).unwrap();
    assert_eq!(sequence.vr, Some(Vr::SQ));

    let rows = elements.iter().find(|element| element.tag == ROWS).unwrap();
    assert_eq!(rows.data, DicomValue::U16(vec![512]));
    assert_eq!(rows.path.to_string(), "(0028,0010)");

    let private = elements.iter().find(|element| element.tag.is_private()).unwrap();
    assert_eq!(private.vr, Some(Vr::UN));
    assert_eq!(private.data, DicomValue::Bytes(vec![1, 2, 3, 4]));
}

#[test]
fn explicit_big_endian_data_set() {
    let mut data_set = tag_bytes(ROWS, true);
    data_set.extend_from_slice(b"US");
    data_set.extend_from_slice(&2u16.to_be_bytes());
    data_set.extend_from_slice(&512u16.to_be_bytes());

    data_set.extend(tag_bytes(Tag::new(0x0018, 0x0050), true));
    data_set.extend_from_slice(b"DS");
    data_set.extend_from_slice(&4u16.to_be_bytes());
    data_set.extend_from_slice(b"2.5 ");

    let tokens = tokens(dicom_file(EXPLICIT_BE, &data_set));
    let elements = elements(&tokens);

    assert_eq!(elements[2].tag, ROWS);
    assert_eq!(elements[2].data, DicomValue::U16(vec![512]));
    assert_eq!(elements[3].data, DicomValue::Strings(vec!["2.5".to_string()]));
}

#[test]
fn encapsulated_pixel_data_fragments() {
    let mut data_set = explicit(ROWS, "US", &2u16.to_le_bytes());
    data_set.extend(explicit_undefined(Tag::PIXEL_DATA, "OB"));
    // 空的偏移表，然后一个片段
    data_set.extend(item(0));
    data_set.extend(item(4));
    data_set.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
    data_set.extend(sequence_delimitation());

    let tokens = tokens(dicom_file(JPEG_BASELINE, &data_set));

    assert_eq!(
        data_set_descriptions(&tokens),
        vec![
            "element (0028,0010)",
            "element (7FE0,0010)",
            "sequence-begin (7FE0,0010)",
            "element (7FE0,0010).#0.(FFFE,E000)",
            "item-begin (7FE0,0010).#0",
            "item-end (7FE0,0010).#0",
            "element (7FE0,0010).#0.(FFFE,E000)",
            "item-begin (7FE0,0010).#1",
            "item-end (7FE0,0010).#1",
            "element (7FE0,0010).#1.(FFFE,E0DD)",
            "sequence-end (7FE0,0010)",
        ]
    );

    let fragments = elements(&tokens)
        .into_iter()
        .filter(|element| element.tag == Tag::ITEM)
        .map(|element| element.data.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        fragments,
        vec![DicomValue::Bytes(vec![]), DicomValue::Bytes(vec![0xFF, 0xD8, 0xFF, 0xD9])]
    );
}

#[test]
fn undefined_length_un_content_is_implicit() {
    let private = Tag::new(0x0009, 0x1010);

    let mut data_set = explicit_undefined(private, "UN");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(implicit(MODALITY, b"OT"));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());
    // 序列之后回到显式vr
    data_set.extend(explicit(PATIENT_SEX, "CS", b"F "));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));

    assert_eq!(
        data_set_descriptions(&tokens),
        vec![
            "element (0009,1010)",
            "sequence-begin (0009,1010)",
            "element (0009,1010).#0.(FFFE,E000)",
            "item-begin (0009,1010).#0",
            "element (0009,1010).#0.(0008,0060)",
            "element (0009,1010).#0.(FFFE,E00D)",
            "item-end (0009,1010).#0",
            "element (0009,1010).#0.(FFFE,E0DD)",
            "sequence-end (0009,1010)",
            "element (0010,0040)",
        ]
    );

    let elements = elements(&tokens);
    let modality = elements.iter().find(|element| element.tag == MODALITY).unwrap();
    assert_eq!(modality.vr, Some(Vr::CS));
    assert_eq!(modality.data, DicomValue::Strings(vec!["OT".to_string()]));

    let sex = elements.iter().find(|element| element.tag == PATIENT_SEX).unwrap();
    assert_eq!(sex.vr, Some(Vr::CS));
    assert_eq!(sex.data, DicomValue::Strings(vec!["F".to_string()]));
}

#[test]
fn large_pixel_data_is_deferred_and_realizable() {
    let pixels = (0..64u16).flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();

    let mut data_set = explicit(Tag::PIXEL_DATA, "OW", &pixels);
    data_set.extend(explicit(Tag::new(0xFFFC, 0xFFFC), "OB", &[0, 0]));

    let bytes = dicom_file(EXPLICIT_LE, &data_set);
    let pixel_offset = (bytes.len() - data_set.len() + 12) as u64;

    let options = ParseOptions {
        lazy_threshold: 32,
        ..ParseOptions::default()
    };
    let mut stream = parse_with(MemorySource::new(bytes), options);

    let mut lazy = None;
    while let Some(token) = stream.next() {
        if let Token::Element(element) = token.unwrap() {
            if element.tag == Tag::PIXEL_DATA {
                lazy = match element.data {
                    DicomValue::Lazy(lazy) => Some(lazy),
                    other => panic!("expected a lazy value, got {:?}", other),
                };
                break;
            }
        }
    }

    let lazy = lazy.unwrap();
    assert_eq!(lazy.offset, pixel_offset);
    assert_eq!(lazy.length, 128);

    // 读取延迟值之后还能接着迭代
    assert_eq!(stream.realize(&lazy).unwrap(), pixels);

    let rest = stream.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(rest.len(), 1);
    assert!(matches!(&rest[0], Token::Element(element) if element.tag == Tag::new(0xFFFC, 0xFFFC)));
}

#[test]
fn truncated_value_fails_after_earlier_tokens() {
    let mut data_set = explicit(MODALITY, "CS", b"OT");
    let mut truncated = explicit(PATIENT_NAME, "PN", b"Doe^John");
    truncated.truncate(truncated.len() - 3);
    data_set.extend(truncated);

    let bytes = dicom_file(EXPLICIT_LE, &data_set);
    let value_offset = (bytes.len() - 5) as u64;

    let mut stream = parse(MemorySource::new(bytes));
    let results = stream.by_ref().collect::<Vec<_>>();

    assert_eq!(results.len(), 6);
    assert!(results[..5].iter().all(|result| result.is_ok()));
    match &results[5] {
        Err(DicomError::ValueIncomplete {
            position,
            expected,
            actual,
        }) => {
            assert_eq!(*position, value_offset);
            assert_eq!(*expected, 8);
            assert_eq!(*actual, 5);
        }
        other => panic!("expected ValueIncomplete, got {:?}", other),
    }
    assert!(stream.next().is_none());
}

#[test]
fn truncated_sequence_is_closed_at_end_of_input() {
    let mut data_set = explicit_undefined(REFERENCED_SERIES, "SQ");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(SOP_INSTANCE, "UI", b"1.2.3.4\0"));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));

    assert_balanced(&tokens);
    assert!(matches!(tokens.last(), Some(Token::SequenceEnd(path)) if path.tag() == REFERENCED_SERIES));
}

#[test]
fn specific_character_set_switches_text_decoding() {
    let (name, _, _) = encoding_rs::GB18030.encode("张三^李四");

    let mut data_set = explicit(Tag::SPECIFIC_CHARACTER_SET, "CS", b"GB18030 ");
    data_set.extend(explicit(PATIENT_NAME, "PN", &pad_even(&name, b' ')));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));
    let name = elements(&tokens)
        .into_iter()
        .find(|element| element.tag == PATIENT_NAME)
        .unwrap();

    assert_eq!(name.data, DicomValue::Strings(vec!["张三^李四".to_string()]));
}

#[test]
fn character_set_is_restored_after_sequence() {
    let mut data_set = explicit_undefined(REFERENCED_SERIES, "SQ");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(Tag::SPECIFIC_CHARACTER_SET, "CS", b"ISO_IR 192"));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());
    data_set.extend(explicit(PATIENT_NAME, "PN", &[0xC9, b'l', b'i', b'e']));

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));
    let name = elements(&tokens)
        .into_iter()
        .find(|element| element.tag == PATIENT_NAME)
        .unwrap();

    // 外层仍然是默认字符集
    assert_eq!(name.data, DicomValue::Strings(vec!["Élie".to_string()]));
}

#[test]
fn character_set_does_not_leak_into_sibling_item() {
    let mut data_set = explicit_undefined(REFERENCED_SERIES, "SQ");
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(Tag::SPECIFIC_CHARACTER_SET, "CS", b"ISO_IR 192"));
    data_set.extend(explicit(PATIENT_NAME, "PN", &pad_even("Élie".as_bytes(), b' ')));
    data_set.extend(item_delimitation());
    data_set.extend(item(UNDEFINED_LENGTH));
    data_set.extend(explicit(PATIENT_NAME, "PN", &[0xC9, b'l', b'i', b'e']));
    data_set.extend(item_delimitation());
    data_set.extend(sequence_delimitation());

    let tokens = tokens(dicom_file(EXPLICIT_LE, &data_set));
    let names = elements(&tokens)
        .into_iter()
        .filter(|element| element.tag == PATIENT_NAME)
        .map(|element| (element.path.to_string(), element.data.clone()))
        .collect::<Vec<_>>();

    // 第二个item仍然是默认字符集
    assert_eq!(
        names,
        vec![
            (
                "(0008,1115).#0.(0010,0010)".to_string(),
                DicomValue::Strings(vec!["Élie".to_string()])
            ),
            (
                "(0008,1115).#1.(0010,0010)".to_string(),
                DicomValue::Strings(vec!["Élie".to_string()])
            ),
        ]
    );
}

#[test]
fn parses_from_a_file() {
    let bytes = dicom_file(EXPLICIT_LE, &explicit(MODALITY, "CS", b"US"));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let tokens = parse_file(file.path(), ParseOptions::default())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(tokens.len(), 5);
    assert!(matches!(
        tokens.last(),
        Some(Token::Element(element)) if element.data == DicomValue::Strings(vec!["US".to_string()])
    ));
}
