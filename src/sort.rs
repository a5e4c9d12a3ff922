use std::cmp::Ordering;
use std::fmt;

use crate::{error::CategoryError, models::Category};

/// Category field usable as a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Sortorder,
    Id,
    Name,
    Idnumber,
    Coursecount,
    Timemodified,
    Depth,
    Path,
}

impl SortField {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "sortorder" => SortField::Sortorder,
            "id" => SortField::Id,
            "name" => SortField::Name,
            "idnumber" => SortField::Idnumber,
            "coursecount" => SortField::Coursecount,
            "timemodified" => SortField::Timemodified,
            "depth" => SortField::Depth,
            "path" => SortField::Path,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Sortorder => "sortorder",
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Idnumber => "idnumber",
            SortField::Coursecount => "coursecount",
            SortField::Timemodified => "timemodified",
            SortField::Depth => "depth",
            SortField::Path => "path",
        }
    }

    fn compare(self, a: &Category, b: &Category) -> Ordering {
        match self {
            SortField::Sortorder => a.sortorder.cmp(&b.sortorder),
            SortField::Id => a.id.cmp(&b.id),
            SortField::Name => compare_text(&a.name, &b.name),
            SortField::Idnumber => compare_text(
                a.idnumber.as_deref().unwrap_or(""),
                b.idnumber.as_deref().unwrap_or(""),
            ),
            SortField::Coursecount => a.coursecount.cmp(&b.coursecount),
            SortField::Timemodified => a.timemodified.cmp(&b.timemodified),
            SortField::Depth => a.depth.cmp(&b.depth),
            SortField::Path => a.path.cmp(&b.path),
        }
    }
}

// Case-insensitive first so "apple" and "Apple" sit together, raw bytes break the tie.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

/// SortSpec
///
/// Ordered list of `(field, direction)` pairs. Never empty; defaults to `sortorder` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            keys: vec![SortKey {
                field: SortField::Sortorder,
                direction: SortDirection::Asc,
            }],
        }
    }
}

impl SortSpec {
    /// Builds a spec from explicit keys. An empty list yields the default spec.
    pub fn new(keys: Vec<SortKey>) -> Self {
        if keys.is_empty() {
            return Self::default();
        }
        Self { keys }
    }

    pub fn by(field: SortField, direction: SortDirection) -> Self {
        Self::new(vec![SortKey { field, direction }])
    }

    /// Parses the query-string form: `name,-id` sorts by name ascending, then id descending.
    /// A field repeated later in the list is ignored. `None` or blank input gives the default.
    pub fn parse(raw: Option<&str>) -> Result<Self, CategoryError> {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::default());
        };

        let mut keys: Vec<SortKey> = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let (name, direction) = match part.strip_prefix('-') {
                Some(name) => (name, SortDirection::Desc),
                None => (part.strip_prefix('+').unwrap_or(part), SortDirection::Asc),
            };
            let field = SortField::parse(name).ok_or_else(|| CategoryError::InvalidCriteria {
                key: format!("sort:{}", name),
            })?;
            if keys.iter().all(|key| key.field != field) {
                keys.push(SortKey { field, direction });
            }
        }
        Ok(Self::new(keys))
    }

    /// `Some(direction)` when the spec is a single `sortorder` key: the compacted sequence
    /// already is in that order and only needs reversing for descending.
    pub fn natural_direction(&self) -> Option<SortDirection> {
        match self.keys.as_slice() {
            [key] if key.field == SortField::Sortorder => Some(key.direction),
            _ => None,
        }
    }

    /// Multi-key comparator. Ties left after every key are broken by ascending id so the
    /// result is deterministic.
    pub fn compare(&self, a: &Category, b: &Category) -> Ordering {
        self.keys
            .iter()
            .fold(Ordering::Equal, |ordering, key| {
                ordering.then_with(|| {
                    let ordering = key.field.compare(a, b);
                    match key.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
            })
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Stable in-place sort of `records`.
    pub fn sort(&self, records: &mut [Category]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

/// Canonical text form, used inside cache keys: `name:asc,id:desc`.
impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, key) in self.keys.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            let direction = match key.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            write!(f, "{}:{}", key.field.as_str(), direction)?;
        }
        Ok(())
    }
}
