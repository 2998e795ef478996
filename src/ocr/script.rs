#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Hangul,
    Kana,
    Han,
    Latin,
}

/// Scripts a detection must contain a letter of, given a tesseract language set.
pub fn scripts_for_languages(languages: &str) -> Vec<Script> {
    let mut scripts = Vec::new();
    for raw in languages.split(['+', ',', ' ']) {
        let lang = raw.trim().to_lowercase();
        if lang.is_empty() {
            continue;
        }
        let found: &[Script] = if lang.starts_with("kor") {
            &[Script::Hangul]
        } else if lang.starts_with("jpn") {
            &[Script::Kana, Script::Han]
        } else if lang.starts_with("chi") {
            &[Script::Han]
        } else {
            &[Script::Latin]
        };
        for script in found {
            if !scripts.contains(script) {
                scripts.push(*script);
            }
        }
    }
    scripts
}

/// With no expected scripts any alphabetic character qualifies.
pub fn has_expected_letter(text: &str, scripts: &[Script]) -> bool {
    text.chars().any(|ch| {
        if scripts.is_empty() {
            return ch.is_alphabetic();
        }
        scripts.iter().any(|script| is_letter_of(ch, *script))
    })
}

fn is_letter_of(ch: char, script: Script) -> bool {
    let code = ch as u32;
    match script {
        Script::Hangul => matches!(code, 0xAC00..=0xD7A3 | 0x1100..=0x11FF | 0x3130..=0x318F),
        Script::Kana => matches!(code, 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9D),
        Script::Han => matches!(code, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF),
        Script::Latin => ch.is_ascii_alphabetic() || matches!(code, 0x00C0..=0x024F),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_set_maps_to_scripts() {
        assert_eq!(
            scripts_for_languages("kor+jpn+eng"),
            vec![Script::Hangul, Script::Kana, Script::Han, Script::Latin]
        );
        assert_eq!(
            scripts_for_languages("chi_sim, jpn_vert"),
            vec![Script::Han, Script::Kana]
        );
        assert_eq!(scripts_for_languages("eng+fra"), vec![Script::Latin]);
        assert!(scripts_for_languages(" + ").is_empty());
    }

    #[test]
    fn letters_are_matched_per_script() {
        let korean = [Script::Hangul];
        assert!(has_expected_letter("…안녕!", &korean));
        assert!(!has_expected_letter("Hello", &korean));
        assert!(has_expected_letter("漢字", &[Script::Han]));
        assert!(has_expected_letter("カタカナ", &[Script::Kana]));
        assert!(has_expected_letter("café", &[Script::Latin]));
        assert!(!has_expected_letter("!?123", &[Script::Latin]));
    }

    #[test]
    fn empty_script_list_accepts_any_letter() {
        assert!(has_expected_letter("Ωmega", &[]));
        assert!(!has_expected_letter("42", &[]));
    }
}
