//! Text normalization for scraped labels.

/// Characters that render as nothing but break equality checks
fn is_invisible(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

/// Strip invisible characters, fold NBSP and ideographic spaces,
/// collapse whitespace runs and trim.
pub fn norm_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if is_invisible(ch) {
            continue;
        }
        if ch.is_whitespace() || ch == '\u{00A0}' || ch == '\u{3000}' {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Same as [`norm_text`] for optional element text.
pub fn norm_opt(s: Option<&str>) -> String {
    s.map(norm_text).unwrap_or_default()
}

/// Derive a model name from a link label.
///
/// Trailing parenthesized annotations such as unit counts (`(12台)`,
/// `（12台）`) are dropped.
pub fn extract_model_name(label: &str) -> String {
    let mut name = norm_text(label);
    loop {
        let trimmed = name.trim_end();
        let open = if trimmed.ends_with(')') {
            trimmed.rfind('(')
        } else if trimmed.ends_with('）') {
            trimmed.rfind('（')
        } else {
            None
        };
        match open {
            Some(idx) if idx > 0 => name = trimmed[..idx].trim_end().to_string(),
            _ => break,
        }
    }
    name
}

/// Remove thousands separators from numeric text
pub fn strip_thousands(s: &str) -> String {
    s.chars().filter(|c| *c != ',' && *c != '，').collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_text_whitespace() {
        assert_eq!(norm_text("  大山\n  オーシャン \t"), "大山 オーシャン");
        assert_eq!(norm_text("\u{3000}楽園\u{3000}池袋店\u{00A0}"), "楽園 池袋店");
    }

    #[test]
    fn test_norm_text_invisible() {
        assert_eq!(norm_text("マイ\u{200B}ジャグラーV\u{FEFF}"), "マイジャグラーV");
        assert_eq!(norm_text(""), "");
        assert_eq!(norm_text("\u{200B}"), "");
    }

    #[test]
    fn test_norm_opt() {
        assert_eq!(norm_opt(None), "");
        assert_eq!(norm_opt(Some(" 東京都 ")), "東京都");
    }

    #[test]
    fn test_extract_model_name() {
        assert_eq!(extract_model_name("マイジャグラーV (12台)"), "マイジャグラーV");
        assert_eq!(extract_model_name("ゴーゴージャグラー3（8台）"), "ゴーゴージャグラー3");
        assert_eq!(extract_model_name(" ミスタージャグラー "), "ミスタージャグラー");
        assert_eq!(extract_model_name("S ネオアイムジャグラーEX KK"), "S ネオアイムジャグラーEX KK");
    }

    #[test]
    fn test_extract_model_name_keeps_bare_parens() {
        assert_eq!(extract_model_name("(不明)"), "(不明)");
    }

    #[test]
    fn test_strip_thousands() {
        assert_eq!(strip_thousands("8,123"), "8123");
        assert_eq!(strip_thousands("-1,234"), "-1234");
        assert_eq!(strip_thousands(" 12 "), "12");
    }
}
