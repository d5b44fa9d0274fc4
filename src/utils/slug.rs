/// Lowercases `title`, collapses every run of non-alphanumerics to `-` and
/// trims leading/trailing dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn collapses_punctuation_and_trims() {
        assert_eq!(slugify("  Music for All!  "), "music-for-all");
        assert_eq!(slugify("Spring Recital -- 2026"), "spring-recital-2026");
        assert_eq!(slugify("¡Hola, Señor!"), "hola-se-or");
        assert_eq!(slugify("---"), "");
    }
}
