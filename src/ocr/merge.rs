use super::OcrWord;
use crate::overlay::BBoxPx;

/// Joins words that share a tesseract line into one entry per line.
///
/// Lines keep the order of their first word; words without a line key stay
/// on their own.
pub(super) fn merge_line_words(words: Vec<OcrWord>) -> Vec<OcrWord> {
    let mut merged: Vec<(OcrWord, usize)> = Vec::new();
    for word in words {
        let len = word.text.chars().count().max(1);
        let existing = word.line.and_then(|key| {
            merged
                .iter_mut()
                .find(|(line, _)| line.line == Some(key))
        });
        match existing {
            Some((line, line_len)) => {
                line.text = join_inline(&line.text, &word.text);
                line.bbox = union_bbox(&line.bbox, &word.bbox);
                line.confidence = merge_conf(line.confidence, *line_len, word.confidence, len);
                *line_len += len;
            }
            None => merged.push((word, len)),
        }
    }
    merged.into_iter().map(|(line, _)| line).collect()
}

fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = (a.x + a.w).max(b.x + b.w);
    let y2 = (a.y + a.h).max(b.y + b.h);
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

fn join_inline(left: &str, right: &str) -> String {
    if needs_space(left, right) {
        format!("{} {}", left.trim_end(), right.trim_start())
    } else {
        format!("{}{}", left.trim_end(), right.trim_start())
    }
}

/// Latin words and Hangul eojeol are space separated; kana and han run together.
fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            (a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric())
                || (is_hangul(a) && is_hangul(b))
                || (a.is_ascii_punctuation() && b.is_alphanumeric())
        }
        _ => false,
    }
}

fn is_hangul(ch: char) -> bool {
    matches!(ch as u32, 0xAC00..=0xD7A3)
}

fn merge_conf(a: f32, a_len: usize, b: f32, b_len: usize) -> f32 {
    let total = (a_len + b_len).max(1) as f32;
    (a * a_len as f32 + b * b_len as f32) / total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x: u32, conf: f32, line: Option<crate::ocr::LineKey>) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence: conf,
            bbox: BBoxPx {
                x,
                y: 5,
                w: 10,
                h: 10,
            },
            line,
        }
    }

    #[test]
    fn korean_words_keep_spaces_japanese_do_not() {
        assert_eq!(join_inline("안녕", "하세요"), "안녕 하세요");
        assert_eq!(join_inline("こんに", "ちは"), "こんにちは");
        assert_eq!(join_inline("Hello,", "world"), "Hello, world");
    }

    #[test]
    fn merge_weights_confidence_by_length() {
        let key = Some((1, 1, 1, 1));
        let merged = merge_line_words(vec![word("ab", 0, 90.0, key), word("abcd", 20, 60.0, key)]);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 70.0).abs() < 1e-4);
        assert_eq!(merged[0].bbox.w, 30);
    }

    #[test]
    fn words_without_line_stay_separate() {
        let merged = merge_line_words(vec![word("a", 0, 90.0, None), word("b", 20, 90.0, None)]);
        assert_eq!(merged.len(), 2);
    }
}
