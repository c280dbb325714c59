/// Article collection state definitions
///
/// An article moves from `Pending` to exactly one terminal status per run.
use crate::ErrorKind;
use serde::Serialize;
use std::fmt;

/// Identifies one article by its publisher id (`oid`) and article id (`aid`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArticleKey {
    pub oid: String,
    pub aid: String,
}

impl ArticleKey {
    pub fn new(oid: &str, aid: &str) -> Self {
        Self {
            oid: oid.to_string(),
            aid: aid.to_string(),
        }
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.oid, self.aid)
    }
}

/// Which listing a page request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageScope {
    /// Top-level comment listing
    Comment,
    /// Reply listing under one parent comment
    Reply,
}

impl PageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Reply => "reply",
        }
    }

    /// Depth of the records produced from pages of this scope
    pub fn depth(&self) -> u8 {
        match self {
            Self::Comment => 0,
            Self::Reply => 1,
        }
    }
}

impl fmt::Display for PageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the collection status of an article within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleStatus {
    /// Registered, walk not finished
    Pending,

    /// Every top-level page was walked
    Success,

    /// Transport failure or HTTP error status
    FailHttp,

    /// Wrapper, schema or field-level payload failure
    FailParse,

    /// No endpoint candidate was available
    FailNoCandidate,

    /// Anything unclassified
    FailUnknown,
}

impl ArticleStatus {
    /// Returns true if no further processing will happen for this article in this run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FailHttp | Self::FailParse | Self::FailNoCandidate | Self::FailUnknown
        )
    }

    /// Maps an error family onto the terminal status it leaves the article in
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Http => Self::FailHttp,
            ErrorKind::Parse | ErrorKind::Schema | ErrorKind::Structural => Self::FailParse,
            ErrorKind::Unknown => Self::FailUnknown,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::FailHttp => "FAIL-HTTP",
            Self::FailParse => "FAIL-PARSE",
            Self::FailNoCandidate => "FAIL-NOCAND",
            Self::FailUnknown => "FAIL-UNKNOWN",
        }
    }

    /// Parses a status from its database representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "SUCCESS" => Some(Self::Success),
            "FAIL-HTTP" => Some(Self::FailHttp),
            "FAIL-PARSE" => Some(Self::FailParse),
            "FAIL-NOCAND" => Some(Self::FailNoCandidate),
            "FAIL-UNKNOWN" => Some(Self::FailUnknown),
            _ => None,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Success,
            Self::FailHttp,
            Self::FailParse,
            Self::FailNoCandidate,
            Self::FailUnknown,
        ]
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!ArticleStatus::Pending.is_terminal());

        assert!(ArticleStatus::Success.is_terminal());
        assert!(ArticleStatus::FailHttp.is_terminal());
        assert!(ArticleStatus::FailParse.is_terminal());
        assert!(ArticleStatus::FailNoCandidate.is_terminal());
        assert!(ArticleStatus::FailUnknown.is_terminal());
    }

    #[test]
    fn test_is_failure() {
        assert!(ArticleStatus::FailHttp.is_failure());
        assert!(ArticleStatus::FailNoCandidate.is_failure());

        assert!(!ArticleStatus::Success.is_failure());
        assert!(!ArticleStatus::Pending.is_failure());
    }

    #[test]
    fn test_from_error_kind() {
        assert_eq!(
            ArticleStatus::from_error_kind(ErrorKind::Http),
            ArticleStatus::FailHttp
        );
        assert_eq!(
            ArticleStatus::from_error_kind(ErrorKind::Parse),
            ArticleStatus::FailParse
        );
        assert_eq!(
            ArticleStatus::from_error_kind(ErrorKind::Schema),
            ArticleStatus::FailParse
        );
        assert_eq!(
            ArticleStatus::from_error_kind(ErrorKind::Structural),
            ArticleStatus::FailParse
        );
        assert_eq!(
            ArticleStatus::from_error_kind(ErrorKind::Unknown),
            ArticleStatus::FailUnknown
        );
    }

    #[test]
    fn test_db_strings() {
        assert_eq!(ArticleStatus::Pending.to_db_string(), "PENDING");
        assert_eq!(ArticleStatus::FailNoCandidate.to_db_string(), "FAIL-NOCAND");
        assert_eq!(
            ArticleStatus::from_db_string("FAIL-HTTP"),
            Some(ArticleStatus::FailHttp)
        );
        assert_eq!(ArticleStatus::from_db_string("failed"), None);
    }

    #[test]
    fn test_roundtrip_db_string() {
        for state in ArticleStatus::all_states() {
            let parsed = ArticleStatus::from_db_string(state.to_db_string());
            assert_eq!(Some(state), parsed, "Failed roundtrip for {:?}", state);
        }
    }

    #[test]
    fn test_article_key_display() {
        let key = ArticleKey::new("001", "0014000001");
        assert_eq!(key.to_string(), "001/0014000001");
    }

    #[test]
    fn test_scope_depth() {
        assert_eq!(PageScope::Comment.depth(), 0);
        assert_eq!(PageScope::Reply.depth(), 1);
        assert_eq!(PageScope::Reply.to_string(), "reply");
    }
}
