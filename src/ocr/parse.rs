use super::OcrWord;
use crate::overlay::BBoxPx;

const WORD_LEVEL: u32 = 5;

/// Word rows of `tesseract ... tsv` output, in the order tesseract emitted them.
///
/// Rows with a negative confidence or blank text carry no word and are skipped.
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();
    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: u32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11..].join("\t");
        if text.trim().is_empty() || conf < 0.0 {
            continue;
        }
        let num = |col: usize| cols[col].trim().parse::<u32>().unwrap_or(0);
        words.push(OcrWord {
            text,
            confidence: conf,
            bbox: BBoxPx {
                x: num(6),
                y: num(7),
                w: num(8),
                h: num(9),
            },
            line: Some((num(1), num(2), num(3), num(4))),
        });
    }
    words
}
