//! OCR transcript cleanup.
//!
//! Glyph substitution here is lossy and cannot be reversed: a real `O`, `S`,
//! `B`, `I` or `l` that touches a digit is rewritten as a digit. The original
//! text is not retained.

pub fn normalize_transcript(lines: &[String]) -> Vec<String> {
    lines.iter().map(|line| normalize_line(line)).collect()
}

pub fn normalize_line(line: &str) -> String {
    let substituted = substitute_confusables(line);
    collapse_separators(&substituted)
}

fn collapse_separators(input: &str) -> String {
    input
        .split(|character: char| character.is_whitespace() || character == ',')
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
}

fn confusable_digit(character: char) -> Option<char> {
    match character {
        'O' => Some('0'),
        'l' | 'I' => Some('1'),
        'S' => Some('5'),
        'B' => Some('8'),
        _ => None,
    }
}

fn substitute_confusables(line: &str) -> String {
    let mut characters = line.chars().collect::<Vec<char>>();
    let mut index = 0usize;

    while index < characters.len() {
        if !characters[index].is_ascii_alphabetic() {
            index += 1;
            continue;
        }

        let start = index;
        while index < characters.len() && characters[index].is_ascii_alphabetic() {
            index += 1;
        }
        let end = index;

        let run = &characters[start..end];
        if !run.iter().all(|character| confusable_digit(*character).is_some()) {
            continue;
        }

        let digit_before = start
            .checked_sub(1)
            .map(|position| characters[position].is_ascii_digit())
            .unwrap_or(false);
        let digit_after = characters
            .get(end)
            .map(|character| character.is_ascii_digit())
            .unwrap_or(false);
        if !digit_before && !digit_after {
            continue;
        }

        for character in &mut characters[start..end] {
            if let Some(digit) = confusable_digit(*character) {
                *character = digit;
            }
        }
    }

    characters.into_iter().collect()
}
