use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The set of companies a caller may see.
///
/// Every repository read and write is filtered by this set. The ids are kept
/// sorted and de-duplicated so two scopes naming the same companies compare
/// equal and share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Uuid>", into = "Vec<Uuid>")]
pub struct CompanyScope(Vec<Uuid>);

impl CompanyScope {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Result<Self> {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            return Err(AppError::Validation(
                "Company scope must contain at least one company".to_string(),
            ));
        }

        Ok(Self(ids))
    }

    /// Scope over a single company.
    pub fn single(company_id: Uuid) -> Self {
        Self(vec![company_id])
    }

    /// Parses a comma-separated list of UUIDs, as sent in query strings.
    pub fn parse(raw: &str) -> Result<Self> {
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Uuid::parse_str(s)
                    .map_err(|_| AppError::Validation(format!("Invalid company id '{}'", s)))
            })
            .collect::<Result<Vec<Uuid>>>()?;

        Self::new(ids)
    }

    pub fn contains(&self, company_id: &Uuid) -> bool {
        self.0.binary_search(company_id).is_ok()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<Uuid>> for CompanyScope {
    type Error = AppError;

    fn try_from(ids: Vec<Uuid>) -> Result<Self> {
        Self::new(ids)
    }
}

impl From<CompanyScope> for Vec<Uuid> {
    fn from(scope: CompanyScope) -> Self {
        scope.0
    }
}

impl fmt::Display for CompanyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(Uuid::to_string).collect();
        write!(f, "{}", joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scope_rejected() {
        assert!(matches!(
            CompanyScope::new(Vec::new()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_scope_sorted_and_deduplicated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let left = CompanyScope::new(vec![a, b, a]).unwrap();
        let right = CompanyScope::new(vec![b, a]).unwrap();

        assert_eq!(left, right);
        assert_eq!(left.len(), 2);
        assert!(left.contains(&a));
        assert!(left.contains(&b));
        assert!(!left.contains(&Uuid::new_v4()));
    }

    #[test]
    fn test_parse_round_trips_display() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let scope = CompanyScope::parse(&format!("{}, {}", a, b)).unwrap();
        let reparsed = CompanyScope::parse(&scope.to_string()).unwrap();
        assert_eq!(scope, reparsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CompanyScope::parse("not-a-uuid").is_err());
        assert!(CompanyScope::parse(" , ").is_err());
    }

    #[test]
    fn test_deserialize_rejects_empty_list() {
        let parsed: std::result::Result<CompanyScope, _> = serde_json::from_str("[]");
        assert!(parsed.is_err());
    }
}
