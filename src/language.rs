//! Reply language selection
//!
//! Detects the language of a prompt and maps it to a fixed "respond in …"
//! directive. Unsupported languages, unreliable detections and input too short
//! to classify all yield no directive; detection never fails loudly.

use whatlang::Lang;

/// Prompts shorter than this (in chars, trimmed) are not classified
const MIN_DETECTABLE_CHARS: usize = 3;

/// Languages with a dedicated reply directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyLanguage {
    Tagalog,
    Spanish,
    French,
    Japanese,
    Korean,
    Chinese,
    Russian,
    Arabic,
    Vietnamese,
    Thai,
    Indonesian,
}

impl ReplyLanguage {
    /// Map a detected language onto a supported reply language
    pub fn from_lang(lang: Lang) -> Option<Self> {
        match lang {
            Lang::Tgl => Some(Self::Tagalog),
            Lang::Spa => Some(Self::Spanish),
            Lang::Fra => Some(Self::French),
            Lang::Jpn => Some(Self::Japanese),
            Lang::Kor => Some(Self::Korean),
            Lang::Cmn => Some(Self::Chinese),
            Lang::Rus => Some(Self::Russian),
            Lang::Ara => Some(Self::Arabic),
            Lang::Vie => Some(Self::Vietnamese),
            Lang::Tha => Some(Self::Thai),
            Lang::Ind => Some(Self::Indonesian),
            _ => None,
        }
    }

    /// Instruction appended to the system prompt
    pub fn directive(self) -> &'static str {
        match self {
            Self::Tagalog => "Please respond in Tagalog.",
            Self::Spanish => "Por favor responde en español.",
            Self::French => "Veuillez répondre en français.",
            Self::Japanese => "日本語で答えてください。",
            Self::Korean => "한국어로 답변해 주세요.",
            Self::Chinese => "请用中文回答。",
            Self::Russian => "Пожалуйста, отвечайте на русском языке.",
            Self::Arabic => "من فضلك أجب بالعربية.",
            Self::Vietnamese => "Vui lòng trả lời bằng tiếng Việt.",
            Self::Thai => "กรุณาตอบเป็นภาษาไทย",
            Self::Indonesian => "Silakan jawab dalam bahasa Indonesia",
        }
    }
}

/// Detect the reply language of a prompt, if confidently supported
pub fn detect(text: &str) -> Option<ReplyLanguage> {
    let text = text.trim();
    if text.chars().count() < MIN_DETECTABLE_CHARS {
        return None;
    }

    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    ReplyLanguage::from_lang(info.lang())
}

/// Directive for a prompt; `None` means "no directive added"
pub fn directive_for(text: &str) -> Option<&'static str> {
    detect(text).map(ReplyLanguage::directive)
}
