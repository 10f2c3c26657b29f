//! Named sort orders accepted by the reorder operation.

use core::str::FromStr;

use crate::error::DomainError;

/// The order a playlist is reordered by.
///
/// Wire names are the strings clients send (`byTitle`, ...). `ByDuration`
/// keeps the historical meaning of that name (newest publish instant first);
/// `ByLength` is the order by actual running time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SortCriterion {
    ByTitle,
    ByPublishedAt,
    ByDuration,
    ByLength,
}

impl SortCriterion {
    pub const ALL: [SortCriterion; 4] = [
        SortCriterion::ByTitle,
        SortCriterion::ByPublishedAt,
        SortCriterion::ByDuration,
        SortCriterion::ByLength,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortCriterion::ByTitle => "byTitle",
            SortCriterion::ByPublishedAt => "byPublishedAt",
            SortCriterion::ByDuration => "byDuration",
            SortCriterion::ByLength => "byLength",
        }
    }
}

impl core::fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortCriterion {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortCriterion::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                DomainError::invalid_argument(format!(
                    "invalid criteria {s:?}: expected one of byTitle, byPublishedAt, byDuration, byLength"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for c in SortCriterion::ALL {
            assert_eq!(c.as_str().parse::<SortCriterion>().unwrap(), c);
        }
    }

    #[test]
    fn unknown_or_miscased_names_are_invalid_arguments() {
        for bad in ["", "byName", "bytitle", "ByTitle", " byTitle"] {
            assert!(matches!(
                bad.parse::<SortCriterion>(),
                Err(DomainError::InvalidArgument(_))
            ));
        }
    }
}
