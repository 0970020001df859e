//! Search-text normalization.
//!
//! Product names are stored alongside a `search_name` with Vietnamese tone
//! marks stripped and letters lowercased; user input goes through the same
//! folding before it is matched.

/// Fold case and strip Vietnamese diacritics, then trim.
pub fn normalize_search_text(s: &str) -> String {
    s.trim().chars().flat_map(char::to_lowercase).map(fold).collect()
}

fn fold(c: char) -> char {
    match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'đ' => 'd',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ' | 'ở'
        | 'ỡ' | 'ợ' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        other => other,
    }
}

/// Escape `%`, `_` and `\` so the text matches literally inside `LIKE`.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tones_and_case() {
        assert_eq!(normalize_search_text("  Cà Phê Sữa Đá "), "ca phe sua da");
        assert_eq!(normalize_search_text("ĐIỆN THOẠI"), "dien thoai");
    }

    #[test]
    fn ascii_passes_through_lowercased() {
        assert_eq!(normalize_search_text("iPhone 15"), "iphone 15");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
