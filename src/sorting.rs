//! Stable ordering of listing rows by one column.

use std::{cmp::Ordering, fmt, str::FromStr};

use crate::listing::EntryRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Time,
    Type,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSortValue(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortKey::Name),
            "time" => Ok(SortKey::Time),
            "type" => Ok(SortKey::Type),
            "size" => Ok(SortKey::Size),
            other => Err(UnknownSortValue(other.to_string())),
        }
    }
}

impl FromStr for SortOrder {
    type Err = UnknownSortValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            other => Err(UnknownSortValue(other.to_string())),
        }
    }
}

impl SortKey {
    /// Column order of the listing table.
    pub const ALL: [SortKey; 4] = [SortKey::Name, SortKey::Type, SortKey::Size, SortKey::Time];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Time => "time",
            SortKey::Type => "type",
            SortKey::Size => "size",
        }
    }

    fn comparator(self) -> fn(&EntryRow, &EntryRow) -> Ordering {
        match self {
            SortKey::Name => compare_by_name,
            SortKey::Time => compare_by_time,
            SortKey::Type => compare_by_type,
            SortKey::Size => compare_by_size,
        }
    }
}

fn compare_by_name(a: &EntryRow, b: &EntryRow) -> Ordering {
    a.name.cmp(&b.name)
}

// The fixed timestamp format sorts lexically in time order.
fn compare_by_time(a: &EntryRow, b: &EntryRow) -> Ordering {
    a.modified_at.cmp(&b.modified_at)
}

fn compare_by_type(a: &EntryRow, b: &EntryRow) -> Ordering {
    a.kind.cmp(&b.kind)
}

fn compare_by_size(a: &EntryRow, b: &EntryRow) -> Ordering {
    a.byte_size.cmp(&b.byte_size)
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

impl fmt::Display for UnknownSortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sort value '{}'", self.0)
    }
}

impl SortSpec {
    /// Both parts must parse; anything else means "leave the listing alone".
    pub fn from_query(key: Option<&str>, order: Option<&str>) -> Option<Self> {
        Some(SortSpec {
            key: key?.parse().ok()?,
            order: order?.parse().ok()?,
        })
    }
}

/// Stable sort: rows with equal keys keep their relative order in both
/// directions.
pub fn sort_rows(rows: &mut [EntryRow], spec: SortSpec) {
    let cmp = spec.key.comparator();
    match spec.order {
        SortOrder::Ascending => rows.sort_by(cmp),
        SortOrder::Descending => rows.sort_by(|a, b| cmp(b, a)),
    }
}

/// Applies the raw `s`/`o` query values, leaving `rows` untouched when either
/// is missing or unrecognized. Returns the ordering that was applied.
pub fn sort_by_query(
    rows: &mut [EntryRow],
    key: Option<&str>,
    order: Option<&str>,
) -> Option<SortSpec> {
    let spec = SortSpec::from_query(key, order)?;
    sort_rows(rows, spec);
    Some(spec)
}
