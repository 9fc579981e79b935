//! Canonical identifier naming.

/// Convert a type or field name into its canonical lower-camel-case form.
///
/// Only the first character is lower-cased; the rest is kept as written.
/// `Person` becomes `person`, `EMail` becomes `eMail`, `email` is unchanged.
pub fn canonical_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_first_character_only() {
        assert_eq!(canonical_name("Person"), "person");
        assert_eq!(canonical_name("EMail"), "eMail");
        assert_eq!(canonical_name("URLPath"), "uRLPath");
    }

    #[test]
    fn test_already_canonical() {
        assert_eq!(canonical_name("email"), "email");
        assert_eq!(canonical_name("first_name"), "first_name");
    }

    #[test]
    fn test_empty_and_unicode() {
        assert_eq!(canonical_name(""), "");
        assert_eq!(canonical_name("Ärger"), "ärger");
    }
}
