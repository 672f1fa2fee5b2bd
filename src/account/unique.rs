//! Username uniqueness resolution.

use crate::account::database::AccountDatabase;
use crate::error::AccountError;

/// Derive an unused username from `base`.
///
/// Returns `base` if it is free, otherwise the first free name among
/// `base1`, `base2`, … `base{max_attempts}`.
pub async fn make_unique(
    accounts: &dyn AccountDatabase,
    base: &str,
    max_attempts: u32,
) -> Result<String, AccountError> {
    if accounts.find_user(base).await?.is_none() {
        return Ok(base.to_string());
    }

    for n in 1..=max_attempts {
        let candidate = format!("{base}{n}");
        if accounts.find_user(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }

    Err(AccountError::NoUniqueName {
        base: base.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSystem;

    #[tokio::test]
    async fn unused_base_returned_unchanged() {
        let system = FakeSystem::new("/nonexistent");
        let name = make_unique(&system, "kano", 10).await.unwrap();
        assert_eq!(name, "kano");
    }

    #[tokio::test]
    async fn appends_first_free_suffix() {
        let system = FakeSystem::new("/nonexistent");
        for name in ["kano", "kano1", "kano2", "kano3", "kano4", "kano5"] {
            system.add_user(name);
        }
        let name = make_unique(&system, "kano", 1_000_000).await.unwrap();
        assert_eq!(name, "kano6");
    }

    #[tokio::test]
    async fn gaps_are_reused() {
        let system = FakeSystem::new("/nonexistent");
        system.add_user("kano");
        system.add_user("kano2");
        let name = make_unique(&system, "kano", 10).await.unwrap();
        assert_eq!(name, "kano1");
    }

    #[tokio::test]
    async fn exhaustion_is_an_error() {
        let system = FakeSystem::new("/nonexistent");
        for name in ["kano", "kano1", "kano2", "kano3"] {
            system.add_user(name);
        }
        let result = make_unique(&system, "kano", 3).await;
        assert!(matches!(
            result,
            Err(AccountError::NoUniqueName { attempts: 3, .. })
        ));
    }
}
