/// Message admission rules — decides which chat messages become training data.
///
/// Pattern checks (URL, custom emoji) look at the first line only; substring
/// checks (mentions, invites, timestamps, code fences) look at the whole
/// content.
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use crate::schema::message::Message;
use crate::schema::rules::ExclusionRules;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[\w/:%#$&?()~.=+\-]+").unwrap());

static EMOJI_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(a)?:\w+:\d+>").unwrap());

/// Unicode general category `Nd` only; `char::is_numeric` would also take
/// Roman numerals and vulgar fractions.
static DECIMAL_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\p{Nd}+$").unwrap());

const INVITE_MARKER: &str = "discord.gg";
const USER_MENTION: &str = "<@";
const CHANNEL_MENTION: &str = "<#";
const COMMAND_MENTION: &str = "</";
const TIMESTAMP_TOKEN: &str = "<t:";
const CODE_FENCE: &str = "```";

/// Why a message was kept out of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Empty,
    BotAuthor,
    ExcludedPrefix,
    DigitsOnly,
    Url,
    CustomEmoji,
    Invite,
    UserMention,
    ChannelMention,
    CommandMention,
    Timestamp,
    CodeBlock,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::BotAuthor => "bot_author",
            Self::ExcludedPrefix => "excluded_prefix",
            Self::DigitsOnly => "digits_only",
            Self::Url => "url",
            Self::CustomEmoji => "custom_emoji",
            Self::Invite => "invite",
            Self::UserMention => "user_mention",
            Self::ChannelMention => "channel_mention",
            Self::CommandMention => "command_mention",
            Self::Timestamp => "timestamp",
            Self::CodeBlock => "code_block",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterVerdict {
    pub rejected: Option<RejectReason>,
}

impl FilterVerdict {
    pub fn admitted(&self) -> bool {
        self.rejected.is_none()
    }
}

/// Stateless message filter.
pub struct MessageFilter;

impl MessageFilter {
    /// Whether `message` is admissible training data under `rules`.
    pub fn admit(message: &Message, rules: &ExclusionRules) -> bool {
        Self::check(message, rules).admitted()
    }

    /// Check a message and report the first failing rule.
    pub fn check(message: &Message, rules: &ExclusionRules) -> FilterVerdict {
        let verdict = FilterVerdict {
            rejected: Self::reject_reason(message, rules),
        };
        match verdict.rejected {
            Some(reason) => debug!(reason = %reason, first_line = message.first_line(), "message rejected"),
            None => debug!(first_line = message.first_line(), "message admitted"),
        }
        verdict
    }

    fn reject_reason(message: &Message, rules: &ExclusionRules) -> Option<RejectReason> {
        let content = message.content.as_str();
        let first_line = message.first_line();

        if content.is_empty() {
            Some(RejectReason::Empty)
        } else if message.author_is_bot {
            Some(RejectReason::BotAuthor)
        } else if rules.matching_prefix(content).is_some() {
            Some(RejectReason::ExcludedPrefix)
        } else if is_decimal_digits(content) {
            Some(RejectReason::DigitsOnly)
        } else if URL_PATTERN.is_match(first_line) {
            Some(RejectReason::Url)
        } else if EMOJI_PATTERN.is_match(first_line) {
            Some(RejectReason::CustomEmoji)
        } else if content.contains(INVITE_MARKER) {
            Some(RejectReason::Invite)
        } else if content.contains(USER_MENTION) {
            Some(RejectReason::UserMention)
        } else if content.contains(CHANNEL_MENTION) {
            Some(RejectReason::ChannelMention)
        } else if content.contains(COMMAND_MENTION) {
            Some(RejectReason::CommandMention)
        } else if content.contains(TIMESTAMP_TOKEN) {
            Some(RejectReason::Timestamp)
        } else if content.contains(CODE_FENCE) {
            Some(RejectReason::CodeBlock)
        } else {
            None
        }
    }
}

/// Non-empty and every character is a Unicode decimal digit.
fn is_decimal_digits(content: &str) -> bool {
    DECIMAL_DIGITS.is_match(content)
}
