//! Command tags.

/// Hands out `A0001`, `A0002`, ... for one connection.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    prefix: char,
    next: u32,
}

impl TagGenerator {
    /// Starts a sequence with `prefix`.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { prefix, next: 1 }
    }

    /// Returns the next tag.
    pub fn next_tag(&mut self) -> String {
        let tag = format!("{}{:04}", self.prefix, self.next);
        // Wrapping is harmless: no session keeps 4 billion commands in flight.
        self.next = self.next.wrapping_add(1);
        tag
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_tags() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next_tag(), "A0001");
        assert_eq!(tags.next_tag(), "A0002");

        let mut custom = TagGenerator::new('P');
        assert_eq!(custom.next_tag(), "P0001");
    }
}
