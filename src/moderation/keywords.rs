/// Substrings that block a comment outright, without consulting any
/// external service. Mostly insults and threats, in the spellings people
/// actually type.
const BLOCKED_KEYWORDS: &[&str] = &[
    "むかつく",
    "ムカつく",
    "ムカツク",
    "腹立つ",
    "ばか",
    "バカ",
    "馬鹿",
    "アホ",
    "ボケ",
    "死ね",
    "しね",
    "殺す",
    "ころす",
];

/// The first blocked keyword contained in `text`, if any.
pub fn find_blocked_keyword(text: &str) -> Option<&'static str> {
    BLOCKED_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| text.contains(keyword))
}
