const MAX_LABEL_LEN: usize = 63;

/// Makes a tag-derived key acceptable as a Kubernetes label key.
pub fn sanitize_label_key(key: &str) -> String {
    sanitize(key)
}

/// Makes a tag value acceptable as a Kubernetes label value. Empty stays empty.
pub fn sanitize_label_value(value: &str) -> String {
    sanitize(value)
}

/// Replaces characters outside `[A-Za-z0-9-_.]` with `-`, trims non-alphanumeric ends and
/// caps the length at 63.
fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = trim_ends(&replaced);
    let capped = &trimmed[..trimmed.len().min(MAX_LABEL_LEN)];
    trim_ends(capped).to_string()
}

fn trim_ends(s: &str) -> &str {
    s.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_and_trims() {
        assert_eq!(sanitize_label_key("tag.team/name"), "tag.team-name");
        assert_eq!(sanitize_label_value("--hello world!!"), "hello-world");
        assert_eq!(sanitize_label_value(""), "");
        assert_eq!(sanitize_label_value("***"), "");
    }

    #[test]
    fn long_values_are_capped_on_an_alphanumeric() {
        let raw = format!("{}-{}", "a".repeat(62), "b".repeat(10));
        let out = sanitize_label_value(&raw);
        assert_eq!(out.len(), 62);
        assert!(out.chars().all(|c| c == 'a'));
    }
}
