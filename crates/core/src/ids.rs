//! Identifier generation
//!
//! Channels are addressed by human-readable slugs derived from their names,
//! with numeric suffixes to resolve collisions. Messages and notes get opaque
//! time+random tokens that callers must not parse or sort by.

use std::collections::HashSet;

use rand::Rng;

use crate::error::ValidationError;

/// Longest accepted channel name, in characters
pub const MAX_NAME_LEN: usize = 50;

/// Base used when a name slugifies to nothing (e.g. "___")
const FALLBACK_SLUG: &str = "channel";

const OPAQUE_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derive a URL-safe slug from free text.
///
/// - Lowercase and trim
/// - Drop everything outside `[a-z0-9]`, whitespace and `-`
/// - Replace whitespace runs with a single dash
/// - Collapse consecutive dashes and strip them from both ends
///
/// # Examples
/// ```
/// use channote_core::ids::slugify;
///
/// assert_eq!(slugify("General Chat"), "general-chat");
/// assert_eq!(slugify("  Rust & Go!  "), "rust-go");
/// assert_eq!(slugify("a -- b"), "a-b");
/// assert_eq!(slugify(""), "");
/// ```
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    // Start true to skip leading dashes
    let mut prev_was_dash = true;

    for c in lowered.trim().chars() {
        let c = if c.is_whitespace() || c == '-' {
            '-'
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            continue;
        };

        if c == '-' {
            if !prev_was_dash {
                slug.push('-');
                prev_was_dash = true;
            }
        } else {
            slug.push(c);
            prev_was_dash = false;
        }
    }

    if slug.ends_with('-') {
        slug.pop();
    }

    slug
}

/// Check a channel name, reporting the first rule it breaks.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len == 0 {
        return Err(ValidationError::EmptyName);
    }
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }
    match name
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || c.is_whitespace() || c == '-' || c == '_'))
    {
        Some(c) => Err(ValidationError::InvalidCharacter(c)),
        None => Ok(()),
    }
}

/// True iff the name is 1..=50 characters of letters, digits, whitespace,
/// hyphens and underscores.
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}

/// Pick a channel id that is not in `existing`.
///
/// Returns `base_slug` itself when free, otherwise the first of
/// `base-1`, `base-2`, ... that is unused.
pub fn allocate_channel_id<'a, I>(base_slug: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = existing.into_iter().collect();
    let base = if base_slug.is_empty() {
        FALLBACK_SLUG
    } else {
        base_slug
    };

    if !taken.contains(base) {
        return base.to_string();
    }

    let mut n: u64 = 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

/// Opaque entity id: `{prefix}-{unix millis}-{9 base36 chars}`.
pub fn opaque_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..OPAQUE_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("General"), "general");
        assert_eq!(slugify("My Project"), "my-project");
        assert_eq!(slugify("  test  "), "test");
        assert_eq!(slugify("foo--bar"), "foo-bar");
        assert_eq!(slugify("-test-"), "test");
        assert_eq!(slugify("Hello World!"), "hello-world");
    }

    #[test]
    fn test_slugify_drops_underscores_and_symbols() {
        assert_eq!(slugify("dev_ops"), "devops");
        assert_eq!(slugify("___"), "");
        assert_eq!(slugify("a!@#b"), "ab");
        assert_eq!(slugify("tab\tand\nnewline"), "tab-and-newline");
    }

    #[test]
    fn test_slugify_non_ascii() {
        assert_eq!(slugify("Café Ünïcode"), "caf-ncode");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn test_slugify_idempotent() {
        let inputs = [
            "",
            "General",
            "  Mixed   CASE -- name  ",
            "---",
            "a - b - c",
            "Ünïcode spaces\u{00a0}here",
            "channel-1699999999999-abc123def",
            "x_y-z 1 2 3",
        ];
        for input in inputs {
            let once = slugify(input);
            assert_eq!(slugify(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("general"));
        assert!(is_valid_name("Team Updates"));
        assert!(is_valid_name("dev_ops-2"));
        assert!(is_valid_name(&"a".repeat(MAX_NAME_LEN)));
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_name(&"a".repeat(51)),
            Err(ValidationError::NameTooLong { len: 51, max: 50 })
        );
        assert_eq!(
            validate_name("rust!"),
            Err(ValidationError::InvalidCharacter('!'))
        );
        assert!(!is_valid_name("café"));
        assert!(!is_valid_name("a/b"));
    }

    #[test]
    fn test_allocate_free_base() {
        assert_eq!(allocate_channel_id("general", ["random"]), "general");
    }

    #[test]
    fn test_allocate_probes_in_order() {
        assert_eq!(allocate_channel_id("general", ["general"]), "general-1");
        assert_eq!(
            allocate_channel_id("general", ["general", "general-1", "general-2"]),
            "general-3"
        );
        // First gap wins
        assert_eq!(
            allocate_channel_id("general", ["general", "general-2"]),
            "general-1"
        );
    }

    #[test]
    fn test_allocate_empty_base() {
        assert_eq!(allocate_channel_id("", Vec::<&str>::new()), "channel");
        assert_eq!(allocate_channel_id("", ["channel"]), "channel-1");
    }

    #[test]
    fn test_opaque_id_shape() {
        let id = opaque_id("note");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "note");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), OPAQUE_SUFFIX_LEN);
        assert_ne!(opaque_id("note"), opaque_id("note"));
    }
}
