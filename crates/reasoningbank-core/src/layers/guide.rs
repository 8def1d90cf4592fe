//! L3 guide compression.
//!
//! Extractive: a guide that fits is returned verbatim; otherwise it is cut at
//! the last sentence end (`.`, `!` or `?` followed by whitespace) in the
//! second half of the budget, else at the last whitespace, else hard.

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Compress `text` to at most `budget` characters.
pub fn pack(text: &str, budget: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    // chars.len() > budget, so chars[end] always exists here.
    let floor = (budget / 2).max(1);
    for end in (floor..=budget).rev() {
        if is_sentence_end(chars[end - 1]) && chars[end].is_whitespace() {
            return chars[..end].iter().collect();
        }
    }

    if let Some(pos) = chars[..=budget].iter().rposition(|c| c.is_whitespace()) {
        let cut: String = chars[..pos].iter().collect();
        let cut = cut.trim_end();
        if !cut.is_empty() {
            return cut.to_string();
        }
    }
    chars[..budget].iter().collect()
}
