//! Operations an attribute can be resolved for, and sort directions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The operation a request performs, used to resolve attribute visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Index,
    #[default]
    Show,
    Create,
    Update,
    Patch,
    Destroy,
    /// Custom actions that are neither reads nor writes of the entity itself
    Other,
    /// Resolution of query-string filter keys
    Filter,
    /// Resolution of sort keys
    Sort,
}

impl Operation {
    /// Operations that write attribute values
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Patch)
    }

    /// Operations that only read attribute values
    pub fn is_read(&self) -> bool {
        !self.is_write()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::Show => "show",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Destroy => "destroy",
            Operation::Other => "other",
            Operation::Filter => "filter",
            Operation::Sort => "sort",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(Operation::Index),
            "show" => Ok(Operation::Show),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "patch" => Ok(Operation::Patch),
            "destroy" => Ok(Operation::Destroy),
            "other" => Ok(Operation::Other),
            "filter" => Ok(Operation::Filter),
            "sort" => Ok(Operation::Sort),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// Direction of an ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// A direction as written by the client; `Default` defers to the attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestedDirection {
    Asc,
    Desc,
    Default,
}

impl RequestedDirection {
    /// Recognizes `a`/`asc`/`ascending` and `d`/`desc`/`descending`, case-insensitively
    pub fn from_word(word: &str) -> Self {
        match word.trim().to_lowercase().as_str() {
            "a" | "asc" | "ascending" => RequestedDirection::Asc,
            "d" | "desc" | "descending" => RequestedDirection::Desc,
            _ => RequestedDirection::Default,
        }
    }

    /// Resolve against the attribute's declared default, falling back to ascending
    pub fn resolve(&self, declared: Option<SortDirection>) -> SortDirection {
        match self {
            RequestedDirection::Asc => SortDirection::Asc,
            RequestedDirection::Desc => SortDirection::Desc,
            RequestedDirection::Default => declared.unwrap_or(SortDirection::Asc),
        }
    }
}
