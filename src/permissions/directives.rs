//! Line-oriented permission edit directives.
//!
//! A buffer is free-form text; only lines starting with `+` (allow),
//! `-` (deny) or `~` (forget) after trimming are directives. Blank lines,
//! `#` comments and anything else are skipped.

use super::profile::PermissionProfile;

pub const ALLOW_MARKER: char = '+';
pub const DENY_MARKER: char = '-';
pub const FORGET_MARKER: char = '~';

/// Directives collected from one buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBatch {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub forget: Vec<String>,
}

impl EditBatch {
    pub fn parse(buffer: &str) -> Self {
        let mut batch = EditBatch::default();

        for line in buffer.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut chars = line.chars();
            let target = match chars.next() {
                Some(ALLOW_MARKER) => &mut batch.allow,
                Some(DENY_MARKER) => &mut batch.deny,
                Some(FORGET_MARKER) => &mut batch.forget,
                _ => continue,
            };

            let tool = chars.as_str().trim();
            if !tool.is_empty() {
                target.push(tool.to_string());
            }
        }

        batch
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty() && self.forget.is_empty()
    }

    /// All allows, then all denies, then all forgets, regardless of line order.
    pub fn apply(&self, profile: &mut PermissionProfile) {
        for tool in &self.allow {
            profile.allow(tool);
        }
        for tool in &self.deny {
            profile.deny(tool);
        }
        for tool in &self.forget {
            profile.forget(tool);
        }
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (label, tools) in [("Allowed", &self.allow), ("Denied", &self.deny), ("Forgotten", &self.forget)] {
            if !tools.is_empty() {
                out.push_str(&format!("{}: {}\n", label, tools.join(", ")));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(buffer: &str, start: PermissionProfile) -> PermissionProfile {
        let mut profile = start;
        EditBatch::parse(buffer).apply(&mut profile);
        profile
    }

    #[test]
    fn test_parse_skips_comments_and_free_text() {
        let buffer = "# Available tools\n\n  Grep\n+ Read \n-Bash\n~  Write\n+\nMode: [plan]\n";
        let batch = EditBatch::parse(buffer);
        assert_eq!(batch.allow, vec!["Read"]);
        assert_eq!(batch.deny, vec!["Bash"]);
        assert_eq!(batch.forget, vec!["Write"]);
    }

    #[test]
    fn test_forget_wins_regardless_of_order() {
        let mut start = PermissionProfile::default();
        start.deny("X");

        for buffer in ["+X\n~X", "~X\n+X"] {
            let profile = applied(buffer, start.clone());
            assert!(!profile.allowed_tools.contains(&"X".to_string()));
            assert!(!profile.disallowed_tools.contains(&"X".to_string()));
        }
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let a = applied("+X\n-X", PermissionProfile::default());
        let b = applied("-X\n+X", PermissionProfile::default());
        assert_eq!(a, b);
        assert_eq!(a.disallowed_tools, vec!["X"]);
        assert!(a.allowed_tools.is_empty());
    }

    #[test]
    fn test_patterns_keep_inner_text() {
        let batch = EditBatch::parse("+ Bash(git:*)\n- Edit(/path/to/dir/*)");
        assert_eq!(batch.allow, vec!["Bash(git:*)"]);
        assert_eq!(batch.deny, vec!["Edit(/path/to/dir/*)"]);
    }

    #[test]
    fn test_summary() {
        let batch = EditBatch::parse("+A\n+B\n~C");
        assert_eq!(batch.summary(), "Allowed: A, B\nForgotten: C\n");
        assert!(EditBatch::parse("nothing here").is_empty());
    }
}
