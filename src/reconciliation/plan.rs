use super::error::ReconcileError;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Data-only description of the writes that turn a current child set into the
/// desired one. Every vector is sorted by key so equal inputs give equal plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<Id> {
    pub delete: Vec<Id>,
    pub update: Vec<PlannedUpdate<Id>>,
    pub insert: Vec<PlannedInsert>,
}

/// A surviving row; it keeps its id, only the flag and position may move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate<Id> {
    pub id: Id,
    pub key: String,
    pub position: i32,
    pub selected: bool,
    pub previous_position: i32,
    pub previous_selected: bool,
}

impl<Id> PlannedUpdate<Id> {
    /// True when applying this update writes a different value.
    pub fn is_change(&self) -> bool {
        self.position != self.previous_position || self.selected != self.previous_selected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInsert {
    pub key: String,
    pub position: i32,
    pub selected: bool,
}

impl<Id> Default for Plan<Id> {
    fn default() -> Self {
        Self {
            delete: Vec::new(),
            update: Vec::new(),
            insert: Vec::new(),
        }
    }
}

impl<Id: Clone + Ord + Debug> Plan<Id> {
    /// Number of children left once the plan is applied.
    pub fn resulting_len(&self) -> usize {
        self.update.len() + self.insert.len()
    }

    /// Applying the plan would not change any stored value.
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty()
            && self.insert.is_empty()
            && self.update.iter().all(|u| !u.is_change())
    }

    /// Key of the child that ends up selected, if any.
    pub fn selected_key(&self) -> Option<&str> {
        self.update
            .iter()
            .filter(|u| u.selected)
            .map(|u| u.key.as_str())
            .chain(
                self.insert
                    .iter()
                    .filter(|i| i.selected)
                    .map(|i| i.key.as_str()),
            )
            .next()
    }

    /// Updates that actually write something, demotions first so two selected
    /// rows never coexist mid-transaction.
    pub fn changed_updates(&self) -> impl Iterator<Item = &PlannedUpdate<Id>> {
        let demotions = self.update.iter().filter(|u| u.is_change() && !u.selected);
        let promotions = self.update.iter().filter(|u| u.is_change() && u.selected);
        demotions.chain(promotions)
    }

    /// Checks the post-state described by this plan.
    ///
    /// Exactly one selected child when the resulting set is non-empty, none
    /// otherwise; keys unique across updates and inserts; no id both deleted
    /// and kept.
    pub fn verify(&self) -> Result<(), ReconcileError> {
        let selected = self.update.iter().filter(|u| u.selected).count()
            + self.insert.iter().filter(|i| i.selected).count();
        let expected = usize::from(self.resulting_len() > 0);
        if selected != expected {
            return Err(ReconcileError::InvariantViolation(format!(
                "plan leaves {} selected children out of {} (expected {})",
                selected,
                self.resulting_len(),
                expected
            )));
        }

        let mut keys = BTreeSet::new();
        for key in self
            .update
            .iter()
            .map(|u| u.key.as_str())
            .chain(self.insert.iter().map(|i| i.key.as_str()))
        {
            if !keys.insert(key) {
                return Err(ReconcileError::InvariantViolation(format!(
                    "key {} appears twice in the resulting set",
                    key
                )));
            }
        }

        let deleted: BTreeSet<&Id> = self.delete.iter().collect();
        if let Some(kept) = self.update.iter().find(|u| deleted.contains(&u.id)) {
            return Err(ReconcileError::InvariantViolation(format!(
                "child {:?} is both deleted and kept",
                kept.id
            )));
        }

        Ok(())
    }
}
