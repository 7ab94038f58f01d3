//! Prompt templates
//!
//! Each template opens with a sentence no other template shares, which is
//! what scripted generators key on in tests.

pub const LANGUAGE_DETECTION: &str = "Identify the language this text is written in. \
Answer with the language name in English, for example \"Chinese\" or \"Japanese\".";

pub const GENRE_DETECTION: &str = "Classify the genres of this story excerpt. \
Choose from: Action, Adventure, Comedy, Drama, Fantasy, Horror, Mystery, Romance, SciFi, \
SliceOfLife, Thriller, Tragedy, Historical, Xianxia, Wuxia, Isekai, Other.";

pub const STYLE_GUIDE: &str = "Write a translation style guide for this story excerpt. \
Cover tone, register, forms of address, honorifics and how to render recurring terms. \
Keep it under 300 words.";

pub const SUMMARY: &str = "Summarize this chapter for a translator who has not read it. \
Name the characters involved and the main events, in at most 200 words.";

pub const ENTITY_EXTRACTION: &str = "Identify the named entities in this text so they can be \
translated consistently. Include characters, places, organizations, items, techniques, titles \
and other recurring domain terms. For each entity give its main name with a translation, \
other names that unambiguously identify it (strong matches), names that could also refer to \
something else such as \"the captain\" (weak matches), a category, and a description.";

pub const RELATIONSHIP_EXTRACTION: &str = "Extract the relationships between the listed \
entities stated in this text. Use only the listed names as subjects and objects. Use a short \
verb phrase as the predicate. Rate importance from 0 to 100.";

pub const TRANSLATOR: &str = "You are a literary translator producing a faithful, natural \
translation.";

pub const REVIEWER: &str = "You are a junior editor reviewing a translation against its source.";

pub const FLUENCY_EDITOR: &str = "You are a fluency editor polishing a finished translation.";

pub fn translator(target_language: &str, context: &str) -> String {
    let mut prompt = format!(
        "{}\nTranslate into {}. Keep paragraph breaks. Where the text gives \
         [Translation Memory ...] hints, use those translations and drop the brackets. \
         Reply with the translation only.",
        TRANSLATOR, target_language
    );
    if !context.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(context);
    }
    prompt
}

pub fn reviewer(approval_marker: &str) -> String {
    format!(
        "{}\nCheck accuracy, omissions, terminology and style. If the translation needs no \
         changes, reply with exactly \"{}\". Otherwise list the changes needed.",
        REVIEWER, approval_marker
    )
}

pub fn fluency_editor(target_language: &str) -> String {
    format!(
        "{}\nThe {} paragraphs below are wrapped in <index N></index N> tags. Return only \
         the paragraphs you improved, each wrapped in the same tags. Return nothing for \
         paragraphs that read well.",
        FLUENCY_EDITOR, target_language
    )
}
