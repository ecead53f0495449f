//! Topic tokenization and validation
//!
//! Splits topic names and subscription filters into levels, recognizes the
//! `$share/<group>/` prefix, and enforces the wildcard placement rules from
//! the MQTT topic-names-and-filters sections:
//! - Topic names MUST NOT contain wildcards (+ or #)
//! - Multi-level wildcard (#) must occupy an entire level and be last
//! - Single-level wildcard (+) must occupy an entire level
//! - Empty levels are preserved (`a//b` is three levels)
//! - Topics starting with $ are system topics with special matching rules

use smallvec::SmallVec;

/// Maximum length of a topic name or filter in bytes
pub const MAX_TOPIC_LENGTH: usize = 65_535;

/// Shared subscription prefix
pub const SHARE_PREFIX: &str = "$share/";

/// A tokenized subscription filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTokens<'a> {
    /// Levels of the effective filter, share prefix stripped
    pub levels: SmallVec<[&'a str; 8]>,
    /// `$share` group name, if this is a shared subscription
    pub share_group: Option<&'a str>,
}

impl FilterTokens<'_> {
    pub fn is_shared(&self) -> bool {
        self.share_group.is_some()
    }

    pub fn has_wildcards(&self) -> bool {
        self.levels.iter().any(|l| *l == "+" || *l == "#")
    }
}

/// Split off a `$share/<group>/` prefix.
/// Returns (group, effective filter) or None for ordinary filters.
fn split_share_prefix(filter: &str) -> Option<(&str, &str)> {
    let rest = filter.strip_prefix(SHARE_PREFIX)?;
    let slash = rest.find('/')?;
    Some((&rest[..slash], &rest[slash + 1..]))
}

/// Tokenize a subscription filter
///
/// Recognizes an optional `$share/<group>/` prefix (group must be
/// non-empty and free of `/`, `+`, `#`), then splits the remainder on `/`.
pub fn tokenize_filter(filter: &str) -> Result<FilterTokens<'_>, &'static str> {
    if filter.is_empty() {
        return Err("topic filter cannot be empty");
    }
    if filter.len() > MAX_TOPIC_LENGTH {
        return Err("topic filter exceeds maximum length");
    }
    if filter.contains('\0') {
        return Err("topic filter cannot contain null character");
    }

    let (share_group, effective) = if filter.starts_with(SHARE_PREFIX) {
        let Some((group, effective)) = split_share_prefix(filter) else {
            return Err("invalid shared subscription format");
        };
        if group.is_empty() {
            return Err("shared subscription group name cannot be empty");
        }
        if group.contains('+') || group.contains('#') {
            return Err("shared subscription group name cannot contain wildcards");
        }
        if effective.is_empty() {
            return Err("shared subscription filter cannot be empty");
        }
        (Some(group), effective)
    } else {
        (None, filter)
    };

    let levels: SmallVec<[&str; 8]> = effective.split('/').collect();

    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            // # must be the entire level and the last level
            if *level != "#" {
                return Err("multi-level wildcard must occupy entire level");
            }
            if i != levels.len() - 1 {
                return Err("multi-level wildcard must be last level");
            }
        }
        if level.contains('+') && *level != "+" {
            return Err("single-level wildcard must occupy entire level");
        }
    }

    Ok(FilterTokens {
        levels,
        share_group,
    })
}

/// Tokenize a publish topic name
///
/// Same split as [`tokenize_filter`], but wildcards and the `$share/`
/// prefix are forbidden outright.
pub fn tokenize_publish(topic: &str) -> Result<SmallVec<[&str; 8]>, &'static str> {
    if topic.is_empty() {
        return Err("topic name cannot be empty");
    }
    if topic.len() > MAX_TOPIC_LENGTH {
        return Err("topic name exceeds maximum length");
    }
    if topic.contains('\0') {
        return Err("topic name cannot contain null character");
    }
    if topic.contains('+') || topic.contains('#') {
        return Err("topic name cannot contain wildcards");
    }
    if topic.starts_with(SHARE_PREFIX) {
        return Err("topic name cannot use the shared subscription prefix");
    }

    Ok(topic.split('/').collect())
}

/// Check if a topic filter matches a topic name
///
/// Standalone oracle used by retained-store implementations; the engine
/// itself matches against the trie. A `$share/<group>/` prefix on the
/// filter is stripped before matching.
///
/// Matching rules:
/// - / is the level separator
/// - + matches exactly one level
/// - # matches zero or more levels (must be last)
/// - $-topics don't match filters starting with + or #
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let filter = match split_share_prefix(filter) {
        Some((_, effective)) => effective,
        None => filter,
    };

    // Topics starting with $ don't match filters starting with + or #
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/').peekable();

    loop {
        let Some(filter_level) = filter_levels.next() else {
            // Filter exhausted: match iff topic is too
            return topic_levels.next().is_none();
        };

        if filter_level == "#" {
            // # matches everything remaining, including zero levels
            return filter_levels.peek().is_none();
        }

        let Some(topic_level) = topic_levels.next() else {
            // Topic exhausted but the filter still has a non-# level
            // ("a/#" vs "a" never gets here, # returns above)
            return false;
        };

        if filter_level != "+" && filter_level != topic_level {
            return false;
        }
    }
}
