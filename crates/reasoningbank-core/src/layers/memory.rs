//! L2 procedural memory block.

use reasoningbank_state::{Item, Polarity};

use super::truncate_chars;

const SECTIONS: [(Polarity, &str); 3] = [
    (Polarity::Success, "Strategies"),
    (Polarity::Failure, "Guardrails"),
    (Polarity::Seed, "General Strategies"),
];

/// Group items by polarity into titled bullet sections, cut to `budget`.
pub fn pack(items: &[Item], budget: usize) -> String {
    if items.is_empty() || budget == 0 {
        return String::new();
    }

    let mut sections = Vec::new();
    for (polarity, heading) in SECTIONS {
        let bullets: Vec<String> = items
            .iter()
            .filter(|item| item.source_polarity == polarity)
            .map(|item| format!("- {}: {}", item.title, one_line(&item.content)))
            .collect();
        if !bullets.is_empty() {
            sections.push(format!("{heading}:\n{}", bullets.join("\n")));
        }
    }

    truncate_chars(&sections.join("\n\n"), budget)
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
