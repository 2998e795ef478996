use chapter_image_translator::settings;
use chapter_image_translator::translation::{render_system_prompt, TOOL_NAME};

#[test]
fn system_prompt_snapshot() {
    let settings = settings::Settings::default();
    let prompt = render_system_prompt(&settings.translation_source_lang, TOOL_NAME).unwrap();
    insta::assert_snapshot!(prompt);
}
