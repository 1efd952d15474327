//! URL-safe identifiers for artworks.
//!
//! A slug names both the artwork directory under the artworks root and the
//! `<slug>.dzi` descriptor inside it, so it must be usable as a path segment
//! and as a URL segment without escaping.

/// Slug used when a filename has no word characters at all.
pub const FALLBACK_SLUG: &str = "artwork";

/// Derive a slug from a filename stem.
///
/// Word characters (`[A-Za-z0-9_]`) are kept and lowercased, runs of
/// whitespace and hyphens collapse to a single `-`, everything else is
/// dropped. Leading and trailing hyphens never appear.
///
/// - `"My Great Painting!"` → `"my-great-painting"`
/// - `"  sunset -- over  the_sea "` → `"sunset-over-the_sea"`
/// - `"???"` → `"artwork"`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch.is_whitespace() {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Whether `segment` can be joined onto the artworks root without escaping it
/// or pointing at a hidden entry.
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\'])
        && !segment.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_slug_shape(slug: &str) -> bool {
        !slug.is_empty()
            && !slug.starts_with('-')
            && !slug.ends_with('-')
            && !slug.contains("--")
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }

    #[test]
    fn title_with_punctuation() {
        assert_eq!(slugify("My Great Painting!"), "my-great-painting");
    }

    #[test]
    fn only_symbols_falls_back() {
        assert_eq!(slugify("???"), FALLBACK_SLUG);
        assert_eq!(slugify(""), FALLBACK_SLUG);
        assert_eq!(slugify(" - - "), FALLBACK_SLUG);
    }

    #[test]
    fn whitespace_and_hyphen_runs_collapse() {
        assert_eq!(slugify("  sunset -- over  the_sea "), "sunset-over-the_sea");
    }

    #[test]
    fn stripped_symbols_do_not_split_words() {
        assert_eq!(slugify("Rock'n'Roll"), "rocknroll");
        assert_eq!(slugify("a ! b"), "a-b");
    }

    #[test]
    fn non_ascii_letters_are_dropped() {
        assert_eq!(slugify("Café Nocturne"), "caf-nocturne");
    }

    #[test]
    fn deterministic_and_well_formed() {
        for input in ["IMG_0042", "Starry Night (1889)", "--x--", "Über 2024"] {
            let first = slugify(input);
            assert_eq!(first, slugify(input));
            assert!(matches_slug_shape(&first), "{input:?} -> {first:?}");
        }
    }

    #[test]
    fn safe_segments() {
        assert!(is_safe_segment("my-great-painting"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment(".staging"));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a\\b"));
    }
}
