//! Dependency resolution for action kinds.
//!
//! Dependencies are declared per kind, not as a per-action DAG: the model is
//! "at most one still-valid prerequisite of each required kind". A required
//! kind counts as satisfied only by a SUCCESS action, and an optional
//! max-age constraint expires old successes so the kind must be redone.
//! "never done" and "expired" are deliberately indistinguishable in the
//! result.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ActionKind;
use crate::store::Session;

/// One prerequisite entry: a required kind and an optional freshness bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRule {
    pub kind: ActionKind,

    /// If set, a success older than this many hours no longer counts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_hours: Option<i64>,
}

impl DependencyRule {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            max_age_hours: None,
        }
    }

    pub fn with_max_age_hours(kind: ActionKind, hours: i64) -> Self {
        Self {
            kind,
            max_age_hours: Some(hours),
        }
    }
}

/// Static, process-wide dependency table: target kind -> ordered rules.
///
/// Injected at construction so tests can supply alternate specs; read-only
/// at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySpec {
    rules: BTreeMap<ActionKind, Vec<DependencyRule>>,
}

impl DependencySpec {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declare the prerequisites for `target`, in execution order.
    pub fn require(mut self, target: ActionKind, rules: Vec<DependencyRule>) -> Self {
        self.rules.insert(target, rules);
        self
    }

    pub fn rules_for(&self, target: ActionKind) -> &[DependencyRule] {
        self.rules.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The table used against the testnet: faucet claims need a waitlist
    /// signup, staking needs both plus faucet funds no older than 23 hours.
    pub fn testnet() -> Self {
        Self::empty()
            .require(
                ActionKind::Faucet,
                vec![DependencyRule::new(ActionKind::Waitlist)],
            )
            .require(
                ActionKind::Stake,
                vec![
                    DependencyRule::new(ActionKind::Waitlist),
                    DependencyRule::with_max_age_hours(ActionKind::Faucet, 23),
                ],
            )
    }
}

/// Pure decision logic over the store: which prerequisites of a target kind
/// are missing or stale for an account.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    spec: DependencySpec,
}

impl DependencyResolver {
    pub fn new(spec: DependencySpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &DependencySpec {
        &self.spec
    }

    /// Ordered list of prerequisite kinds that must be (re)done before
    /// `target` may run for this account. Declaration order is preserved;
    /// later entries may assume earlier ones succeeded.
    pub fn missing_dependencies(
        &self,
        session: &mut Session,
        account_id: i64,
        target: ActionKind,
    ) -> Result<Vec<ActionKind>> {
        let now = Utc::now();
        let mut missing = Vec::new();

        for rule in self.spec.rules_for(target) {
            let last_success =
                session.find_latest_successful_action(account_id, rule.kind)?;

            let satisfied = match (&last_success, rule.max_age_hours) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(action), Some(max_age)) => {
                    now - action.created_at <= Duration::hours(max_age)
                }
            };

            if !satisfied {
                missing.push(rule.kind);
            }
        }

        Ok(missing)
    }

    /// True when `target` has zero missing prerequisites. Re-evaluated at
    /// action creation time; a race against concurrent state changes is
    /// accepted.
    pub fn can_perform(
        &self,
        session: &mut Session,
        account_id: i64,
        target: ActionKind,
    ) -> Result<bool> {
        Ok(self
            .missing_dependencies(session, account_id, target)?
            .is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionStatus, NewAccount};
    use crate::store::Store;
    use tempfile::TempDir;

    fn setup() -> (Store, TempDir, i64) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("test.db")).unwrap();
        let session = store.session().unwrap();
        let account = session
            .insert_account(&NewAccount {
                email: "a@example.com".to_string(),
                address: "0xa".to_string(),
                private_key: "key-a".to_string(),
                proxy: None,
                headers: serde_json::Map::new(),
            })
            .unwrap();
        (store, temp, account.id)
    }

    fn record_success(session: &Session, account_id: i64, kind: ActionKind) -> i64 {
        let action = session
            .create_action(account_id, kind, &serde_json::Map::new())
            .unwrap();
        session
            .update_action_status(action.id, ActionStatus::Success, &serde_json::Map::new())
            .unwrap();
        action.id
    }

    #[test]
    fn test_unknown_kind_is_unconditionally_eligible() {
        let (store, _temp, account_id) = setup();
        let mut session = store.session().unwrap();
        let resolver = DependencyResolver::new(DependencySpec::empty());

        assert!(resolver
            .missing_dependencies(&mut session, account_id, ActionKind::Stake)
            .unwrap()
            .is_empty());
        assert!(resolver
            .can_perform(&mut session, account_id, ActionKind::Stake)
            .unwrap());
    }

    #[test]
    fn test_missing_until_success_recorded() {
        let (store, _temp, account_id) = setup();
        let mut session = store.session().unwrap();
        let resolver = DependencyResolver::new(DependencySpec::testnet());

        assert_eq!(
            resolver
                .missing_dependencies(&mut session, account_id, ActionKind::Faucet)
                .unwrap(),
            vec![ActionKind::Waitlist]
        );

        // A failed attempt does not satisfy the dependency
        let failed = session
            .create_action(account_id, ActionKind::Waitlist, &serde_json::Map::new())
            .unwrap();
        session
            .update_action_status(failed.id, ActionStatus::Failed, &serde_json::Map::new())
            .unwrap();
        assert_eq!(
            resolver
                .missing_dependencies(&mut session, account_id, ActionKind::Faucet)
                .unwrap(),
            vec![ActionKind::Waitlist]
        );

        record_success(&session, account_id, ActionKind::Waitlist);
        assert!(resolver
            .missing_dependencies(&mut session, account_id, ActionKind::Faucet)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_declaration_order_preserved() {
        let (store, _temp, account_id) = setup();
        let mut session = store.session().unwrap();
        let resolver = DependencyResolver::new(DependencySpec::testnet());

        assert_eq!(
            resolver
                .missing_dependencies(&mut session, account_id, ActionKind::Stake)
                .unwrap(),
            vec![ActionKind::Waitlist, ActionKind::Faucet]
        );
    }

    #[test]
    fn test_stale_success_counts_as_missing() {
        let (store, _temp, account_id) = setup();
        let mut session = store.session().unwrap();
        let resolver = DependencyResolver::new(DependencySpec::testnet());

        record_success(&session, account_id, ActionKind::Waitlist);
        let faucet_id = record_success(&session, account_id, ActionKind::Faucet);

        assert!(resolver
            .can_perform(&mut session, account_id, ActionKind::Stake)
            .unwrap());

        // 30h-old faucet success against a 23h bound must be redone
        session
            .backdate_action(faucet_id, Utc::now() - Duration::hours(30))
            .unwrap();
        assert_eq!(
            resolver
                .missing_dependencies(&mut session, account_id, ActionKind::Stake)
                .unwrap(),
            vec![ActionKind::Faucet]
        );
    }

    #[test]
    fn test_fresh_success_under_max_age_is_satisfied() {
        let (store, _temp, account_id) = setup();
        let mut session = store.session().unwrap();
        let resolver = DependencyResolver::new(DependencySpec::testnet());

        record_success(&session, account_id, ActionKind::Waitlist);
        let faucet_id = record_success(&session, account_id, ActionKind::Faucet);

        // One hour younger than the 23h limit
        session
            .backdate_action(faucet_id, Utc::now() - Duration::hours(22))
            .unwrap();
        assert!(resolver
            .missing_dependencies(&mut session, account_id, ActionKind::Stake)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_spec_deserializes_from_yaml() {
        let yaml = r#"
stake:
  - kind: waitlist
  - kind: faucet
    max_age_hours: 23
"#;
        let spec: DependencySpec = serde_yaml::from_str(yaml).unwrap();
        let rules = spec.rules_for(ActionKind::Stake);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].kind, ActionKind::Waitlist);
        assert_eq!(rules[1].max_age_hours, Some(23));
    }
}
