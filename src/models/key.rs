use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// The four levels of the work breakdown, outermost first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Epic,
    Story,
    Task,
    Subtask,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [Self::Epic, Self::Story, Self::Task, Self::Subtask];

    /// Classify a raw key by shape alone.
    ///
    /// The checks run in a fixed order: an `E` key without dots is an epic,
    /// any `S` key is a story, a key with three or more dots is a subtask,
    /// and any remaining `T` key is a task. The dot count only discriminates
    /// once the prefix rules have been exhausted.
    pub fn resolve(raw: &str) -> Result<Self> {
        if raw.starts_with('E') && !raw.contains('.') {
            Ok(Self::Epic)
        } else if raw.starts_with('S') {
            Ok(Self::Story)
        } else if raw.matches('.').count() >= 3 {
            Ok(Self::Subtask)
        } else if raw.starts_with('T') {
            Ok(Self::Task)
        } else {
            Err(TrackerError::InvalidKey(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
            Self::Subtask => "subtask",
        }
    }

    /// Plural form, as used by the command surface and table names.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Epic => "epics",
            Self::Story => "stories",
            Self::Task => "tasks",
            Self::Subtask => "subtasks",
        }
    }

    pub fn from_plural(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.plural() == s || kind.as_str() == s)
    }

    pub fn prefix(&self) -> char {
        match self {
            Self::Epic => 'E',
            Self::Story => 'S',
            Self::Task | Self::Subtask => 'T',
        }
    }

    /// Number of numeric segments in a well-formed key of this kind.
    pub fn segment_count(&self) -> usize {
        match self {
            Self::Epic => 1,
            Self::Story => 2,
            Self::Task => 3,
            Self::Subtask => 4,
        }
    }

    /// Heading rank in plan documents; lower ranks enclose higher ones.
    pub fn rank(&self) -> u8 {
        self.segment_count() as u8
    }

    pub fn parent_kind(&self) -> Option<Self> {
        match self {
            Self::Epic => None,
            Self::Story => Some(Self::Epic),
            Self::Task => Some(Self::Story),
            Self::Subtask => Some(Self::Task),
        }
    }

    pub fn child_kind(&self) -> Option<Self> {
        match self {
            Self::Epic => Some(Self::Story),
            Self::Story => Some(Self::Task),
            Self::Task => Some(Self::Subtask),
            Self::Subtask => None,
        }
    }

    /// Whether items of this kind carry description, priority and `started_at`.
    /// Subtasks are the only kind that does not.
    pub fn is_detailed(&self) -> bool {
        !matches!(self, Self::Subtask)
    }

    /// Only tasks carry effort estimates.
    pub fn has_effort(&self) -> bool {
        matches!(self, Self::Task)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated item identifier such as `E1`, `S1.2`, `T1.2.3` or `T1.2.3.4`.
///
/// The kind is resolved once at parse time and carried with the key, so
/// callers never re-inspect the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemKey {
    kind: ItemKind,
    segments: Vec<u32>,
}

impl ItemKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || TrackerError::InvalidKey(raw.to_string());

        let kind = ItemKind::resolve(raw)?;
        let rest = raw.strip_prefix(kind.prefix()).ok_or_else(invalid)?;

        let segments = rest
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u32>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>>>()?;

        if segments.len() != kind.segment_count() {
            return Err(invalid());
        }

        Ok(Self { kind, segments })
    }

    pub fn epic(n: u32) -> Self {
        Self {
            kind: ItemKind::Epic,
            segments: vec![n],
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// The epic number this key belongs to.
    pub fn epic_number(&self) -> u32 {
        self.segments[0]
    }

    /// The parent key implied by the numbering (`T1.2.3` -> `S1.2`).
    pub fn implied_parent(&self) -> Option<ItemKey> {
        let kind = self.kind.parent_kind()?;
        Some(Self {
            kind,
            segments: self.segments[..kind.segment_count()].to_vec(),
        })
    }

    /// The `n`th child key under this one (`S1.2`, 3 -> `T1.2.3`).
    pub fn child(&self, n: u32) -> Option<ItemKey> {
        let kind = self.kind.child_kind()?;
        let mut segments = self.segments.clone();
        segments.push(n);
        Some(Self { kind, segments })
    }

    /// True when `self` is `ancestor` or lies in its subtree.
    pub fn is_within(&self, ancestor: &ItemKey) -> bool {
        self.kind >= ancestor.kind && self.segments.starts_with(&ancestor.segments)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.prefix())?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for ItemKey {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemKey {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ItemKey> for String {
    fn from(key: ItemKey) -> Self {
        key.to_string()
    }
}

/// Keys order by prefix letter, then numerically by segment, so `T1.1.2`
/// sorts before `T1.1.10` and a task sorts directly before its subtasks.
impl Ord for ItemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .prefix()
            .cmp(&other.kind.prefix())
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl PartialOrd for ItemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(raw: &str) -> ItemKind {
        ItemKey::parse(raw).unwrap().kind()
    }

    #[test]
    fn test_resolves_each_kind() {
        assert_eq!(kind_of("E1"), ItemKind::Epic);
        assert_eq!(kind_of("S1.2"), ItemKind::Story);
        assert_eq!(kind_of("T1.2.3"), ItemKind::Task);
        assert_eq!(kind_of("T1.2.3.4"), ItemKind::Subtask);
        assert_eq!(kind_of("E12"), ItemKind::Epic);
        assert_eq!(kind_of("T10.20.30.40"), ItemKind::Subtask);
    }

    #[test]
    fn test_resolution_order_is_prefix_first() {
        // An S key is a story by prefix even with enough dots for a subtask,
        // so the shape check then rejects it.
        assert_eq!(ItemKind::resolve("S1.1.1.1").unwrap(), ItemKind::Story);
        assert!(ItemKey::parse("S1.1.1.1").is_err());

        // An E key with dots falls through to the dot-count rule.
        assert_eq!(ItemKind::resolve("E1.1.1.1").unwrap(), ItemKind::Subtask);
        assert!(ItemKey::parse("E1.1.1.1").is_err());
    }

    #[test]
    fn test_rejects_malformed_keys() {
        for raw in [
            "", "X1", "E", "E1.2", "S1", "S1.", "S.1", "T1", "T1.2", "T1.2.3.4.5", "t1.1.1",
            "T1.a.3", "E-1", " E1", "S1.2 ",
        ] {
            assert!(
                matches!(ItemKey::parse(raw), Err(TrackerError::InvalidKey(_))),
                "expected {:?} to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_display_round_trips_raw_form() {
        for raw in ["E1", "S3.14", "T1.2.3", "T7.3.1.2"] {
            assert_eq!(ItemKey::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_implied_parent_and_child() {
        let task = ItemKey::parse("T1.2.3").unwrap();
        assert_eq!(task.implied_parent().unwrap().to_string(), "S1.2");
        assert_eq!(task.child(4).unwrap().to_string(), "T1.2.3.4");
        assert_eq!(
            ItemKey::parse("S1.2").unwrap().implied_parent().unwrap(),
            ItemKey::epic(1)
        );
        assert!(ItemKey::epic(1).implied_parent().is_none());
        assert!(ItemKey::parse("T1.1.1.1").unwrap().child(1).is_none());
    }

    #[test]
    fn test_numeric_ordering() {
        let mut keys: Vec<ItemKey> = ["T1.1.10", "S1.1", "T1.1.2", "E2", "T1.1.2.1", "E10", "E1"]
            .iter()
            .map(|k| ItemKey::parse(k).unwrap())
            .collect();
        keys.sort();
        let ordered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            ordered,
            vec!["E1", "E2", "E10", "S1.1", "T1.1.2", "T1.1.2.1", "T1.1.10"]
        );
    }

    #[test]
    fn test_is_within() {
        let epic = ItemKey::epic(1);
        let story = ItemKey::parse("S1.2").unwrap();
        let task = ItemKey::parse("T1.2.3").unwrap();
        let other = ItemKey::parse("T2.1.1").unwrap();
        assert!(task.is_within(&epic));
        assert!(task.is_within(&story));
        assert!(story.is_within(&story));
        assert!(!other.is_within(&epic));
        assert!(!epic.is_within(&story));
    }

    #[test]
    fn test_serde_uses_raw_string() {
        let key = ItemKey::parse("T1.2.3").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"T1.2.3\"");
        let back: ItemKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<ItemKey>("\"Q1\"").is_err());
    }
}
