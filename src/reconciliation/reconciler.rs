use super::error::ReconcileError;
use super::plan::{Plan, PlannedInsert, PlannedUpdate};
use super::validate;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// A persisted child row as seen by the reconciler.
pub trait ChildRecord {
    type Id: Clone + Ord + Debug;

    fn record_id(&self) -> Self::Id;
    /// Identity of the child within its parent's set.
    fn key(&self) -> &str;
    fn is_selected(&self) -> bool;
    fn position(&self) -> i32;
}

/// One caller-supplied entry of the desired set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    pub key: String,
    pub selected: Option<bool>,
}

impl DesiredEntry {
    pub fn new(key: impl Into<String>, selected: Option<bool>) -> Self {
        Self {
            key: key.into(),
            selected,
        }
    }
}

pub type KeyValidator = fn(&str) -> Result<(), String>;

/// Computes reconciliation plans. Holds only policy, never a connection.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    validate_key: KeyValidator,
    max_entries: Option<usize>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(validate::non_empty_key)
    }
}

struct Wanted<'a> {
    key: &'a str,
    flag: Option<bool>,
}

impl Reconciler {
    pub fn new(validate_key: KeyValidator) -> Self {
        Self {
            validate_key,
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Builds the plan that turns `current` into `desired`.
    ///
    /// Desired keys are trimmed and deduplicated: the last occurrence decides
    /// the flag, the first occurrence decides the position. The selected child
    /// is the earliest entry flagged `true`, else the first entry, else none.
    pub fn compute_plan<R: ChildRecord>(
        &self,
        current: &[R],
        desired: &[DesiredEntry],
    ) -> Result<Plan<R::Id>, ReconcileError> {
        let wanted = self.dedupe(desired)?;

        let selected_slot = wanted
            .iter()
            .position(|w| w.flag == Some(true))
            .or(if wanted.is_empty() { None } else { Some(0) });

        let mut by_key: BTreeMap<&str, Vec<&R>> = BTreeMap::new();
        for record in current {
            by_key.entry(record.key()).or_default().push(record);
        }

        let mut survivors: HashMap<&str, &R> = HashMap::with_capacity(wanted.len());
        let mut deleted: Vec<(&str, R::Id)> = Vec::new();
        for (key, mut rows) in by_key {
            let is_wanted = wanted.iter().any(|w| w.key == key);
            if is_wanted {
                // Legacy data may hold the same key twice; keep the best row.
                rows.sort_by(|a, b| {
                    b.is_selected()
                        .cmp(&a.is_selected())
                        .then(a.position().cmp(&b.position()))
                        .then(a.record_id().cmp(&b.record_id()))
                });
                let mut rows = rows.into_iter();
                if let Some(keep) = rows.next() {
                    survivors.insert(key, keep);
                }
                deleted.extend(rows.map(|r| (key, r.record_id())));
            } else {
                deleted.extend(rows.into_iter().map(|r| (key, r.record_id())));
            }
        }

        let mut plan = Plan::default();
        for (slot, want) in wanted.iter().enumerate() {
            let position = i32::try_from(slot).map_err(|_| ReconcileError::TooManyEntries {
                limit: i32::MAX as usize,
                actual: wanted.len(),
            })?;
            let selected = selected_slot == Some(slot);
            match survivors.get(want.key) {
                Some(row) => plan.update.push(PlannedUpdate {
                    id: row.record_id(),
                    key: want.key.to_string(),
                    position,
                    selected,
                    previous_position: row.position(),
                    previous_selected: row.is_selected(),
                }),
                None => plan.insert.push(PlannedInsert {
                    key: want.key.to_string(),
                    position,
                    selected,
                }),
            }
        }

        deleted.sort();
        plan.delete = deleted.into_iter().map(|(_, id)| id).collect();
        plan.update.sort_by(|a, b| a.key.cmp(&b.key));
        plan.insert.sort_by(|a, b| a.key.cmp(&b.key));

        plan.verify()?;
        Ok(plan)
    }

    /// Validates `desired` without a snapshot and returns its distinct key count.
    pub fn check_desired(&self, desired: &[DesiredEntry]) -> Result<usize, ReconcileError> {
        self.dedupe(desired).map(|wanted| wanted.len())
    }

    fn dedupe<'a>(&self, desired: &'a [DesiredEntry]) -> Result<Vec<Wanted<'a>>, ReconcileError> {
        let mut wanted: Vec<Wanted<'a>> = Vec::with_capacity(desired.len());
        let mut slots: HashMap<&'a str, usize> = HashMap::with_capacity(desired.len());

        for (index, entry) in desired.iter().enumerate() {
            let key = entry.key.trim();
            (self.validate_key)(key).map_err(|reason| ReconcileError::invalid_entry(index, reason))?;

            match slots.get(key) {
                Some(&slot) => wanted[slot].flag = entry.selected,
                None => {
                    slots.insert(key, wanted.len());
                    wanted.push(Wanted {
                        key,
                        flag: entry.selected,
                    });
                }
            }
        }

        if let Some(limit) = self.max_entries {
            if wanted.len() > limit {
                return Err(ReconcileError::TooManyEntries {
                    limit,
                    actual: wanted.len(),
                });
            }
        }

        Ok(wanted)
    }
}

/// Plans with the default policy (any non-empty key, no size limit).
pub fn compute_plan<R: ChildRecord>(
    current: &[R],
    desired: &[DesiredEntry],
) -> Result<Plan<R::Id>, ReconcileError> {
    Reconciler::default().compute_plan(current, desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Debug, Clone)]
    struct Row {
        id: u32,
        key: &'static str,
        selected: bool,
        position: i32,
    }

    impl ChildRecord for Row {
        type Id = u32;

        fn record_id(&self) -> u32 {
            self.id
        }
        fn key(&self) -> &str {
            self.key
        }
        fn is_selected(&self) -> bool {
            self.selected
        }
        fn position(&self) -> i32 {
            self.position
        }
    }

    fn row(id: u32, key: &'static str, selected: bool, position: i32) -> Row {
        Row {
            id,
            key,
            selected,
            position,
        }
    }

    fn want(key: &str) -> DesiredEntry {
        DesiredEntry::new(key, None)
    }

    fn want_flag(key: &str, selected: bool) -> DesiredEntry {
        DesiredEntry::new(key, Some(selected))
    }

    #[test]
    fn first_image_on_empty_set_becomes_primary() {
        let plan = compute_plan::<Row>(&[], &[want("a")]).unwrap();
        assert!(plan.delete.is_empty());
        assert!(plan.update.is_empty());
        assert_eq!(
            plan.insert,
            vec![PlannedInsert {
                key: "a".into(),
                position: 0,
                selected: true
            }]
        );
    }

    #[test]
    fn existing_primary_stays_and_new_image_is_secondary() {
        let current = [row(1, "a", true, 0)];
        let plan = compute_plan(&current, &[want("a"), want("b")]).unwrap();

        assert!(plan.delete.is_empty());
        assert_eq!(plan.update.len(), 1);
        assert_eq!(plan.update[0].id, 1);
        assert!(plan.update[0].selected);
        assert!(!plan.update[0].is_change());
        assert_eq!(
            plan.insert,
            vec![PlannedInsert {
                key: "b".into(),
                position: 1,
                selected: false
            }]
        );
    }

    #[test]
    fn dropping_primary_promotes_explicit_choice() {
        let current = [row(1, "a", true, 0), row(2, "b", false, 1)];
        let plan = compute_plan(&current, &[want_flag("b", true)]).unwrap();

        assert_eq!(plan.delete, vec![1]);
        assert_eq!(plan.update.len(), 1);
        let kept = &plan.update[0];
        assert_eq!(kept.id, 2);
        assert!(kept.selected);
        assert_eq!(kept.position, 0);
        assert!(plan.insert.is_empty());
    }

    #[test]
    fn first_declared_primary_wins() {
        let plan =
            compute_plan::<Row>(&[], &[want_flag("a", true), want_flag("b", true)]).unwrap();
        assert_eq!(plan.selected_key(), Some("a"));
        let b = plan.insert.iter().find(|i| i.key == "b").unwrap();
        assert!(!b.selected);
    }

    #[test]
    fn duplicate_urls_collapse_with_last_flag_and_first_position() {
        let plan =
            compute_plan::<Row>(&[], &[want("a"), want("b"), want_flag("a", true)]).unwrap();
        assert_eq!(plan.insert.len(), 2);
        let a = plan.insert.iter().find(|i| i.key == "a").unwrap();
        assert_eq!(a.position, 0);
        assert!(a.selected);
        let b = plan.insert.iter().find(|i| i.key == "b").unwrap();
        assert_eq!(b.position, 1);
        assert!(!b.selected);
    }

    #[test]
    fn later_unflagged_duplicate_clears_flag() {
        let plan = compute_plan::<Row>(
            &[],
            &[want("b"), want_flag("a", true), want("a")],
        )
        .unwrap();
        // "a" lost its flag to the last occurrence, so the first entry wins
        assert_eq!(plan.selected_key(), Some("b"));
    }

    #[test]
    fn empty_desired_deletes_everything() {
        let current = [row(1, "a", true, 0), row(2, "b", false, 1)];
        let plan = compute_plan(&current, &[]).unwrap();
        assert_eq!(plan.delete, vec![1, 2]);
        assert!(plan.update.is_empty());
        assert!(plan.insert.is_empty());
        assert_eq!(plan.selected_key(), None);
    }

    #[test]
    fn reordering_moves_primary_to_new_first_entry() {
        let current = [row(1, "a", true, 0), row(2, "b", false, 1)];
        let plan = compute_plan(&current, &[want("b"), want("a")]).unwrap();
        let a = plan.update.iter().find(|u| u.key == "a").unwrap();
        let b = plan.update.iter().find(|u| u.key == "b").unwrap();
        assert!(!a.selected);
        assert_eq!(a.position, 1);
        assert!(b.selected);
        assert_eq!(b.position, 0);
    }

    #[test]
    fn mirrored_desired_set_is_noop() {
        let current = [row(7, "b", false, 1), row(3, "a", true, 0)];
        let plan = compute_plan(&current, &[want_flag("a", true), want("b")]).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.update.len(), 2);
    }

    #[test]
    fn legacy_duplicate_rows_keep_primary_survivor() {
        let current = [row(1, "a", false, 0), row(2, "a", true, 1), row(3, "c", false, 2)];
        let plan = compute_plan(&current, &[want("a")]).unwrap();
        assert_eq!(plan.update.len(), 1);
        assert_eq!(plan.update[0].id, 2);
        assert_eq!(plan.delete, vec![1, 3]);
    }

    #[test]
    fn keys_are_trimmed_before_matching() {
        let current = [row(1, "a", true, 0)];
        let plan = compute_plan(&current, &[want("  a ")]).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn invalid_key_reports_index() {
        let err = compute_plan::<Row>(&[], &[want("a"), want("   ")]).unwrap_err();
        assert_matches!(err, ReconcileError::InvalidEntry { index: 1, .. });
    }

    #[test]
    fn domain_validator_is_applied() {
        let reconciler = Reconciler::new(validate::resource_locator);
        let err = reconciler
            .compute_plan::<Row>(&[], &[want("/ok.png"), want("ftp://x/y.png")])
            .unwrap_err();
        assert_matches!(err, ReconcileError::InvalidEntry { index: 1, .. });
    }

    #[test]
    fn entry_limit_counts_distinct_keys() {
        let reconciler = Reconciler::default().with_max_entries(2);
        assert!(reconciler
            .compute_plan::<Row>(&[], &[want("a"), want("b"), want("a")])
            .is_ok());
        let err = reconciler
            .compute_plan::<Row>(&[], &[want("a"), want("b"), want("c")])
            .unwrap_err();
        assert_matches!(err, ReconcileError::TooManyEntries { limit: 2, actual: 3 });
    }

    #[test]
    fn check_desired_counts_distinct_trimmed_keys() {
        let reconciler = Reconciler::default();
        assert_eq!(
            reconciler
                .check_desired(&[want("a"), want(" a"), want("b")])
                .unwrap(),
            2
        );
        assert_matches!(
            reconciler.check_desired(&[want("")]),
            Err(ReconcileError::InvalidEntry { index: 0, .. })
        );
    }
}
