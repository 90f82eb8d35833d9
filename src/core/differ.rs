use sha2::{Digest, Sha256};
use similar::TextDiff;

/// Calculate SHA256 hash of content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Line diffs between the loaded and patched text of a file
pub struct ContentDiffer {
    context_radius: usize,
}

impl ContentDiffer {
    pub fn new(context_radius: usize) -> Self {
        Self { context_radius }
    }

    /// Unified diff labelled `a/<label>` and `b/<label>`, empty when nothing changed
    pub fn diff_content(&self, label: &str, old_content: &str, new_content: &str) -> String {
        if old_content == new_content {
            return String::new();
        }

        TextDiff::from_lines(old_content, new_content)
            .unified_diff()
            .context_radius(self.context_radius)
            .header(&format!("a/{}", label), &format!("b/{}", label))
            .to_string()
    }
}

impl Default for ContentDiffer {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_reports_only_insertions() {
        let differ = ContentDiffer::default();
        let diff = differ.diff_content("Program.cs", "a\nc\n", "a\nb\nc\n");

        assert!(diff.contains("+b"));
        assert!(diff.contains("a/Program.cs"));
        assert!(!diff.lines().any(|line| line.starts_with('-') && !line.starts_with("---")));
    }

    #[test]
    fn test_unchanged_content_has_empty_diff() {
        let differ = ContentDiffer::default();

        assert!(differ.diff_content("f", "same", "same").is_empty());
        assert_eq!(content_hash("x"), content_hash("x"));
        assert_ne!(content_hash("x"), content_hash("y"));
    }
}
