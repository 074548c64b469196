//! Display order of the rows of a form.
//!
//! Order keys are sparse integers, [`ORDER_STEP`] apart when seeded. Two
//! strategies keep them consistent:
//!
//! * local insertion ([`key_above`], [`key_below`]) picks the midpoint between
//!   the target and its neighbour, touching no other row;
//! * dense renumbering ([`dense_keys`]) rewrites every key of the form. It is
//!   used for drag reordering, and after a local insertion found no gap.
//!
//! Rows from before ordering existed have no key. Before any insertion the
//! whole form is normalized with [`sparse_keys`].

use super::{EditOutcome, LogStoreError, MarEditor, Resync};
use crate::db::RecordStore;
use crate::error::{MarResult, ValidationError};
use crate::models::{LineItem, LineItemKind, LineItemPatch, MedicationSchedule, NewLineItem};
use std::cmp::Ordering;
use std::collections::HashMap;
use time::{Date, Time};
use tracing::debug;

pub const ORDER_STEP: i64 = 10;

/// Where a new row goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Directly above the given line-item.
    Above(i64),
    /// Directly below the given line-item.
    Below(i64),
    /// Vitals at the top, medications at the bottom.
    Default,
}

/// A key chosen for a local insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKey {
    /// Strictly between the target and its neighbour.
    Gap(i64),
    /// No gap was left; the key is the target's key moved by one and may
    /// collide with the neighbour.
    Adjacent(i64),
}

impl InsertKey {
    pub fn value(self) -> i64 {
        match self {
            InsertKey::Gap(key) | InsertKey::Adjacent(key) => key,
        }
    }
}

/// Key for a row inserted directly above `target`, whose upper neighbour has key `above`.
pub fn key_above(target: i64, above: Option<i64>) -> InsertKey {
    match above {
        None => InsertKey::Gap(target - ORDER_STEP),
        Some(above) => {
            let mid = above + (target - above) / 2;
            if mid == above || mid == target {
                InsertKey::Adjacent(target - 1)
            } else {
                InsertKey::Gap(mid)
            }
        }
    }
}

/// Key for a row inserted directly below `target`, whose lower neighbour has key `below`.
pub fn key_below(target: i64, below: Option<i64>) -> InsertKey {
    match below {
        None => InsertKey::Gap(target + ORDER_STEP),
        Some(below) => {
            let mid = target + (below - target) / 2;
            if mid == below || mid == target {
                InsertKey::Adjacent(target + 1)
            } else {
                InsertKey::Gap(mid)
            }
        }
    }
}

/// Key for a row added without a position: vitals above the smallest key,
/// medications below the largest.
pub fn default_key(items: &[LineItem], vitals: bool) -> i64 {
    let keys = items.iter().filter_map(|i| i.display_order);
    let edge = if vitals { keys.min() } else { keys.max() };
    match (edge, vitals) {
        (None, _) => ORDER_STEP,
        (Some(min), true) => min - ORDER_STEP,
        (Some(max), false) => max + ORDER_STEP,
    }
}

/// True when a row has no key or two rows share one. `items` must be sorted.
pub fn needs_normalization(items: &[LineItem]) -> bool {
    items.iter().any(|i| i.display_order.is_none())
        || items
            .windows(2)
            .any(|pair| pair[0].display_order == pair[1].display_order)
}

/// `index * 10` for every row, in the given order.
pub fn sparse_keys(items: &[LineItem]) -> Vec<(i64, i64)> {
    keys_from(items, 0)
}

/// `(index + 1) * 10` for every row, in the given order.
pub fn dense_keys(items: &[LineItem]) -> Vec<(i64, i64)> {
    keys_from(items, 1)
}

fn keys_from(items: &[LineItem], first: i64) -> Vec<(i64, i64)> {
    (first..)
        .zip(items)
        .map(|(slot, item)| (item.id, slot * ORDER_STEP))
        .collect()
}

type GroupKey = (String, String, Date, Option<Date>);

fn group_key(schedule: &MedicationSchedule) -> GroupKey {
    (
        schedule.name.clone(),
        schedule.dosage.clone(),
        schedule.start_date,
        schedule.stop_date,
    )
}

fn hour_rank(hour: Option<Time>) -> (bool, Option<Time>) {
    (hour.is_none(), hour)
}

/// Sorts rows for display.
///
/// Keyed rows come first, ascending. Unkeyed rows follow: vitals, then
/// medications grouped by name, dosage and date range, each group in order of
/// nominal hour.
pub fn sort_line_items(items: &mut [LineItem]) {
    let mut group_first: HashMap<GroupKey, i64> = HashMap::new();
    for item in items.iter() {
        if let (None, LineItemKind::Medication(schedule)) = (item.display_order, &item.kind) {
            group_first
                .entry(group_key(schedule))
                .and_modify(|first| *first = (*first).min(item.id))
                .or_insert(item.id);
        }
    }
    let unkeyed_rank = |item: &LineItem| match &item.kind {
        LineItemKind::Vitals(_) => (0, item.id, (false, None)),
        LineItemKind::Medication(schedule) => (
            1,
            group_first
                .get(&group_key(schedule))
                .copied()
                .unwrap_or(item.id),
            hour_rank(item.hour),
        ),
    };
    items.sort_by(|a, b| match (a.display_order, b.display_order) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => unkeyed_rank(a)
            .cmp(&unkeyed_rank(b))
            .then(a.id.cmp(&b.id)),
    });
}

impl<S: RecordStore> MarEditor<'_, S> {
    /// The rows of a form in display order, with every row keyed.
    fn ordered_items(&self, form_id: i64) -> MarResult<Vec<LineItem>> {
        let mut items = self.store.line_items_for_form(form_id)?;
        sort_line_items(&mut items);
        if needs_normalization(&items) {
            let keys = sparse_keys(&items);
            self.store
                .set_display_orders(&keys)
                .logged("normalize display order")?;
            for (item, (_, key)) in items.iter_mut().zip(&keys) {
                item.display_order = Some(*key);
            }
            debug!(form_id, rows = keys.len(), "normalized display order");
        }
        Ok(items)
    }

    /// Adds one row to a form.
    pub fn add_line_item(
        &self,
        item: NewLineItem,
        placement: Placement,
    ) -> MarResult<(LineItem, EditOutcome)> {
        if let LineItemKind::Medication(schedule) = &item.kind {
            check_dates(schedule.start_date, schedule.stop_date)?;
        }
        let (mut created, outcome) = self.insert_block(vec![item], placement)?;
        let item = created
            .pop()
            .ok_or(ValidationError::MissingField("line item"))?;
        Ok((item, outcome))
    }

    /// Adds a medication given at several nominal hours as a contiguous block
    /// of rows, one per hour. The frequency is the number of hours.
    ///
    /// # Errors
    ///
    /// At least one hour is required, and a stop date may not precede the start date.
    pub fn add_medication(
        &self,
        form_id: i64,
        mut schedule: MedicationSchedule,
        hours: &[Time],
        placement: Placement,
    ) -> MarResult<(Vec<LineItem>, EditOutcome)> {
        if schedule.name.trim().is_empty() {
            return Err(ValidationError::MissingField("medication name").into());
        }
        if hours.is_empty() {
            return Err(ValidationError::MissingField("administration hour").into());
        }
        check_dates(schedule.start_date, schedule.stop_date)?;
        schedule.frequency = u8::try_from(hours.len()).ok();

        let mut sorted = hours.to_vec();
        sorted.sort();
        let drafts = sorted
            .into_iter()
            .map(|hour| NewLineItem {
                form_id,
                kind: LineItemKind::Medication(schedule.clone()),
                hour: Some(hour),
                notes: None,
                parameter: None,
                display_order: None,
            })
            .collect();
        self.insert_block(drafts, placement)
    }

    fn insert_block(
        &self,
        mut drafts: Vec<NewLineItem>,
        placement: Placement,
    ) -> MarResult<(Vec<LineItem>, EditOutcome)> {
        let Some(first) = drafts.first() else {
            return Err(ValidationError::MissingField("line item").into());
        };
        let form_id = first.form_id;
        let vitals = matches!(first.kind, LineItemKind::Vitals(_));
        self.store.get_form(form_id)?;

        let items = self.ordered_items(form_id)?;
        let key_at = |index: usize| items.get(index).and_then(|i| i.display_order);
        let position = |id: i64| {
            items
                .iter()
                .position(|i| i.id == id)
                .ok_or(ValidationError::UnknownLineItem(id))
        };

        let (insert_at, mut next) = match placement {
            Placement::Default if vitals => (0, InsertKey::Gap(default_key(&items, true))),
            Placement::Default => (items.len(), InsertKey::Gap(default_key(&items, false))),
            Placement::Above(id) => {
                let at = position(id)?;
                let target = key_at(at).unwrap_or_default();
                let above = at.checked_sub(1).and_then(key_at);
                (at, key_above(target, above))
            }
            Placement::Below(id) => {
                let at = position(id)?;
                let target = key_at(at).unwrap_or_default();
                (at + 1, key_below(target, key_at(at + 1)))
            }
        };

        // Later rows of the block stack below the first, above the row at `insert_at`.
        let mut collided = false;
        let mut taken: Vec<i64> = items.iter().filter_map(|i| i.display_order).collect();
        for draft in drafts.iter_mut() {
            let key = next.value();
            collided |= matches!(next, InsertKey::Adjacent(_)) && taken.contains(&key);
            taken.push(key);
            draft.display_order = Some(key);
            next = key_below(key, key_at(insert_at));
        }

        let mut created = self
            .store
            .insert_line_items(&drafts)
            .logged("insert line items")?;

        if collided {
            let mut order = items;
            order.splice(insert_at..insert_at, created.iter().cloned());
            let keys = dense_keys(&order);
            self.store
                .set_display_orders(&keys)
                .logged("renumber display order")?;
            let by_id: HashMap<i64, i64> = keys.into_iter().collect();
            for item in &mut created {
                item.display_order = by_id.get(&item.id).copied();
            }
        }
        debug!(
            form_id,
            rows = created.len(),
            renumbered = collided,
            "line items added"
        );
        Ok((created, EditOutcome::applied(Resync::Form(form_id))))
    }

    /// Moves a row to `new_index` in display order and renumbers the form densely.
    pub fn move_line_item(&self, line_item_id: i64, new_index: usize) -> MarResult<EditOutcome> {
        let item = self.store.get_line_item(line_item_id)?;
        let mut items = self.store.line_items_for_form(item.form_id)?;
        sort_line_items(&mut items);
        let Some(from) = items.iter().position(|i| i.id == line_item_id) else {
            return Err(ValidationError::UnknownLineItem(line_item_id).into());
        };
        let moved = items.remove(from);
        let to = new_index.min(items.len());
        items.insert(to, moved);

        self.store
            .set_display_orders(&dense_keys(&items))
            .logged("reorder line items")?;
        debug!(form_id = item.form_id, line_item_id, from, to, "line item moved");
        let outcome = if from == to {
            EditOutcome::unchanged(Resync::Form(item.form_id))
        } else {
            EditOutcome::applied(Resync::Form(item.form_id))
        };
        Ok(outcome)
    }

    /// Changes the hour, notes, parameter or stop date of a row.
    ///
    /// Display order is managed by [`Self::move_line_item`] and is ignored here.
    pub fn update_schedule(
        &self,
        line_item_id: i64,
        mut patch: LineItemPatch,
    ) -> MarResult<(LineItem, EditOutcome)> {
        let item = self.store.get_line_item(line_item_id)?;
        patch.display_order = None;
        if let Some(stop) = patch.stop_date {
            let Some(schedule) = item.medication() else {
                return Err(ValidationError::WrongKind {
                    expected: "medication",
                }
                .into());
            };
            check_dates(schedule.start_date, stop)?;
        }
        let updated = self
            .store
            .update_line_item(item.id, &patch)
            .logged("update line item")?;
        debug!(form_id = item.form_id, line_item_id, "schedule updated");
        Ok((updated, EditOutcome::applied(Resync::LineItem(item.id))))
    }

    /// Deletes a row and all of its marks.
    pub fn delete_line_item(&self, line_item_id: i64) -> MarResult<EditOutcome> {
        let item = self.store.get_line_item(line_item_id)?;
        self.store
            .delete_line_item(item.id)
            .logged("delete line item")?;
        debug!(form_id = item.form_id, line_item_id, "line item deleted");
        Ok(EditOutcome::applied(Resync::Form(item.form_id)))
    }
}

fn check_dates(start: Date, stop: Option<Date>) -> Result<(), ValidationError> {
    match stop {
        Some(stop) if stop < start => Err(ValidationError::StopBeforeStart {
            start: start.to_string(),
            stop: stop.to_string(),
        }),
        _ => Ok(()),
    }
}
