//! Title canonicalization for scraped listings.
//!
//! The cinema site renders titles in unreliable casing (all caps, stray
//! uppercase mid-word) and the corrupted variants also carry accents that
//! the clean form does not. Normalization repairs casing word by word,
//! leaving acronyms and already-clean words alone.

/// Canonicalize a raw scraped title. Idempotent and total: any input
/// (including empty) returns a string.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut word = String::new();

    for c in raw.chars() {
        if c.is_alphabetic() || c == '\'' || c == '\u{2019}' {
            word.push(c);
        } else {
            flush_word(&mut out, &word);
            word.clear();
            out.push(c);
        }
    }
    flush_word(&mut out, &word);
    out
}

fn flush_word(out: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }
    if is_acronym(word) {
        out.push_str(word);
    } else if has_corrupted_casing(word) {
        out.push_str(&repair_word(word));
    } else {
        out.push_str(word);
    }
}

/// All-uppercase words longer than one character pass through unchanged.
fn is_acronym(word: &str) -> bool {
    word.chars().count() > 1
        && word
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

/// Uppercase anywhere after the first character signals scraped-casing
/// corruption.
fn has_corrupted_casing(word: &str) -> bool {
    word.chars().skip(1).any(|c| c.is_uppercase())
}

/// Strip diacritics, lowercase, then capitalize the first alphabetic
/// character.
fn repair_word(word: &str) -> String {
    let mut repaired = String::with_capacity(word.len());
    let mut capitalized = false;
    for c in word.chars() {
        let folded = fold_diacritic(c);
        for lower in folded.to_lowercase() {
            if !capitalized && lower.is_alphabetic() {
                repaired.extend(lower.to_uppercase());
                capitalized = true;
            } else {
                repaired.push(lower);
            }
        }
    }
    repaired
}

/// Map accented Latin letters to their base letter. Covers the ranges the
/// cinema site actually emits (Spanish and Portuguese titles).
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}
