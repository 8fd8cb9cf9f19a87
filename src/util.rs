use encoding_rs::Encoding;

// 默认字符集是 ISO_IR 100，windows-1252 是它的超集
pub fn default_encoding() -> &'static Encoding {
    encoding_rs::WINDOWS_1252
}

// specific character set (0008,0005) 的值 -> 解码用的字符集
// 多值的情况只看第一个值，ISO 2022 的代码扩展不处理
pub fn encoding_for_character_set(term: &str) -> Option<&'static Encoding> {
    let term = term.trim().trim_end_matches('\0');

    let encoding = match term {
        "" | "ISO_IR 6" | "ISO 2022 IR 6" => default_encoding(),
        "ISO_IR 100" | "ISO 2022 IR 100" => encoding_rs::WINDOWS_1252,
        "ISO_IR 101" | "ISO 2022 IR 101" => encoding_rs::ISO_8859_2,
        "ISO_IR 109" | "ISO 2022 IR 109" => encoding_rs::ISO_8859_3,
        "ISO_IR 110" | "ISO 2022 IR 110" => encoding_rs::ISO_8859_4,
        "ISO_IR 144" | "ISO 2022 IR 144" => encoding_rs::ISO_8859_5,
        "ISO_IR 127" | "ISO 2022 IR 127" => encoding_rs::ISO_8859_6,
        "ISO_IR 126" | "ISO 2022 IR 126" => encoding_rs::ISO_8859_7,
        "ISO_IR 138" | "ISO 2022 IR 138" => encoding_rs::ISO_8859_8,
        "ISO_IR 148" | "ISO 2022 IR 148" => encoding_rs::WINDOWS_1254,
        "ISO_IR 166" | "ISO 2022 IR 166" => encoding_rs::WINDOWS_874,
        "ISO_IR 13" | "ISO 2022 IR 13" => encoding_rs::SHIFT_JIS,
        "ISO 2022 IR 149" => encoding_rs::EUC_KR,
        "ISO_IR 192" => encoding_rs::UTF_8,
        "GB18030" => encoding_rs::GB18030,
        "GBK" => encoding_rs::GBK,
        _ => return None,
    };

    Some(encoding)
}

// 去掉DICOM值末尾的填充（空格或者\0）
pub fn trim_padding(text: &str) -> &str {
    text.trim_end_matches(['\0', ' '])
}

pub fn decode_text(buffer: &[u8], encoding: &'static Encoding) -> String {
    let (result, _) = encoding.decode_without_bom_handling(buffer);
    result.into_owned()
}

// 多值文本用反斜杠分隔，每个值前后的空格都没有意义
pub fn split_multi_valued(text: &str) -> Vec<String> {
    let text = trim_padding(text);

    if text.is_empty() {
        return Vec::new();
    }

    text.split('\\')
        .map(|v| v.trim_matches([' ', '\0']).to_string())
        .collect()
}

pub fn process_vec_to_hex(buffer: &[u8]) -> String {
    buffer
        .iter()
        .map(|ele| format!("{:02X}", ele))
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_set_terms() {
        assert_eq!(encoding_for_character_set("ISO_IR 192"), Some(encoding_rs::UTF_8));
        assert_eq!(encoding_for_character_set("GB18030 "), Some(encoding_rs::GB18030));
        assert_eq!(encoding_for_character_set(""), Some(default_encoding()));
        assert_eq!(encoding_for_character_set("ISO_IR 999"), None);
    }

    #[test]
    fn multi_valued_text() {
        assert_eq!(split_multi_valued("ORIGINAL\\PRIMARY\\AXIAL "), vec!["ORIGINAL", "PRIMARY", "AXIAL"]);
        assert_eq!(split_multi_valued("1.2.3\0"), vec!["1.2.3"]);
        assert!(split_multi_valued("  ").is_empty());
        assert_eq!(split_multi_valued("A\\\\B"), vec!["A", "", "B"]);
    }

    #[test]
    fn decodes_with_selected_charset() {
        let bytes = "张三".as_bytes();
        assert_eq!(decode_text(bytes, encoding_rs::UTF_8), "张三");

        let (gbk, _, _) = encoding_rs::GBK.encode("张三");
        assert_eq!(decode_text(&gbk, encoding_rs::GBK), "张三");

        assert_eq!(decode_text(&[0xC9], default_encoding()), "É");
    }

    #[test]
    fn hex_dump() {
        assert_eq!(process_vec_to_hex(&[0x44, 0x49, 0x0A]), "44 49 0A");
    }
}
