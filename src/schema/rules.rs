use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::message::ChannelId;

/// Which channels and message prefixes are kept out of the corpus.
///
/// Built once from configuration and shared read-only by a harvest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExclusionRules {
    pub excluded_channel_ids: FxHashSet<ChannelId>,
    /// Checked in order against the raw message content.
    pub excluded_prefixes: Vec<String>,
}

impl ExclusionRules {
    pub fn new(channels: impl IntoIterator<Item = u64>, prefixes: Vec<String>) -> Self {
        Self {
            excluded_channel_ids: channels.into_iter().map(ChannelId).collect(),
            excluded_prefixes: prefixes,
        }
    }

    pub fn excludes_channel(&self, id: ChannelId) -> bool {
        self.excluded_channel_ids.contains(&id)
    }

    /// The first configured prefix `content` starts with, if any.
    pub fn matching_prefix(&self, content: &str) -> Option<&str> {
        self.excluded_prefixes
            .iter()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .find(|p| content.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_creation() {
        let rules = ExclusionRules::new([1, 2], vec!["!".to_string()]);
        assert!(rules.excludes_channel(ChannelId(1)));
        assert!(!rules.excludes_channel(ChannelId(3)));
        assert_eq!(rules.matching_prefix("!make"), Some("!"));
        assert_eq!(rules.matching_prefix("make"), None);
    }

    #[test]
    fn empty_prefix_never_matches() {
        let rules = ExclusionRules::new([], vec![String::new()]);
        assert_eq!(rules.matching_prefix("anything"), None);
    }
}
