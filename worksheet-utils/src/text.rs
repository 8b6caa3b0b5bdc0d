use std::sync::LazyLock;

use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);?").expect("static regex is valid")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex is valid"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex is valid"));
static UNSAFE_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static regex is valid"));
static ARABIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\u{0590}-\u{08FF}\u{FB1D}-\u{FDFF}\u{FE70}-\u{FEFF}]").expect("static regex is valid")
});
static STRONG_LATIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]").expect("static regex is valid"));

pub const LEFT_TO_RIGHT_ISOLATE: char = '\u{2066}';
pub const POP_DIRECTIONAL_ISOLATE: char = '\u{2069}';

/// Unescapes HTML entities. Unless `keep_html` is set, tags are then removed
/// and whitespace collapsed.
pub fn clean_text(text: &str, keep_html: bool) -> String {
    let unescaped = unescape_entities(text);
    if keep_html {
        return unescaped;
    }
    let without_tags = TAG_RE.replace_all(&unescaped, " ");
    WHITESPACE_RE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

pub fn clean_optional(text: Option<&str>, keep_html: bool) -> String {
    text.map(|t| clean_text(t, keep_html)).unwrap_or_default()
}

/// Each entity is resolved on its own. Unknown names and stray ampersands
/// stay as written, and a missing `;` is tolerated.
fn unescape_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            resolve_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn resolve_entity(entity: &str) -> Option<String> {
    let Some(number) = entity.strip_prefix('#') else {
        return resolve_html5_entity(entity).map(str::to_string);
    };
    let code = match number.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => number.parse::<u32>().ok(),
    };
    let c = code
        .and_then(char::from_u32)
        .filter(|c| *c != '\0')
        .unwrap_or(char::REPLACEMENT_CHARACTER);
    Some(c.to_string())
}

/// Replaces characters that are not allowed in file names or object keys.
pub fn sanitize_file_stem(title: &str) -> String {
    UNSAFE_FILENAME_RE.replace_all(title, "_").into_owned()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rtl,
    Ltr,
    Mixed,
    Neutral,
}

impl Direction {
    pub fn is_right_to_left(self) -> bool {
        matches!(self, Direction::Rtl | Direction::Mixed)
    }
}

pub fn contains_arabic(text: &str) -> bool {
    ARABIC_RE.is_match(text)
}

pub fn contains_strong_latin(text: &str) -> bool {
    STRONG_LATIN_RE.is_match(text)
}

/// Ratio of Arabic to Latin letters and digits decides the direction.
pub fn detect_direction(text: &str) -> Direction {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        let code = c as u32;
        if (0x0590..=0x08FF).contains(&code) || (0xFB1D..=0xFEFC).contains(&code) {
            arabic += 1;
        } else if c.is_ascii_alphanumeric() {
            latin += 1;
        }
    }

    let total = arabic + latin;
    if total == 0 {
        return Direction::Neutral;
    }
    let ratio = arabic as f64 / total as f64;
    if ratio > 0.6 {
        Direction::Rtl
    } else if ratio < 0.2 {
        Direction::Ltr
    } else {
        Direction::Mixed
    }
}

/// Prepares one run of text for a paragraph with the given direction.
///
/// In right-to-left paragraphs Arabic runs get Arabic punctuation, and purely
/// Latin runs are wrapped in an isolate so numbers and formulas keep their
/// order.
pub fn shape_run(text: &str, paragraph: Direction) -> String {
    if !paragraph.is_right_to_left() {
        return text.to_string();
    }

    let arabic = contains_arabic(text);
    let latin = contains_strong_latin(text);
    let mut shaped = if arabic && (paragraph == Direction::Rtl || !latin) {
        text.replace(',', "\u{060C}")
            .replace('?', "\u{061F}")
            .replace(';', "\u{061B}")
    } else {
        text.to_string()
    };

    if latin && !arabic {
        shaped = format!("{LEFT_TO_RIGHT_ISOLATE}{shaped}{POP_DIRECTIONAL_ISOLATE}");
    }
    shaped
}

/// Arabic-Indic digits, used for question and choice numbering.
pub fn arabic_indic_number(n: usize) -> String {
    n.to_string()
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(0x0660 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}
