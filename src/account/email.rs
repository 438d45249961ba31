//! Email normalization.

/// Lower-case the domain part of an email address.
///
/// The local part is kept untouched, as some providers treat it as case
/// sensitive. Addresses without `@` are returned as given.
pub fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_is_lowercased() {
        assert_eq!(normalize_email("Jean@EXAMPLE.org"), "Jean@example.org");
        assert_eq!(normalize_email("jean@example.com"), "jean@example.com");
    }

    #[test]
    fn test_last_at_splits() {
        assert_eq!(
            normalize_email("\"a@b\"@Example.ORG"),
            "\"a@b\"@example.org"
        );
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(normalize_email("  Bob@Example.com \n"), "Bob@example.com");
    }

    #[test]
    fn test_without_at() {
        assert_eq!(normalize_email("NotAnEmail"), "NotAnEmail");
        assert_eq!(normalize_email(" spaced "), " spaced ");
    }
}
