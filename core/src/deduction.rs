//! First-expires-first-out inventory deduction for "mark as cooked".

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{IngredientLine, InventoryRecord};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum CookError {
    #[error("servings must be a positive number (got {0})")]
    InvalidServings(f64),
    #[error("recipe {0} not found")]
    RecipeNotFound(i64),
    #[error("could not update inventory")]
    InventoryUpdate(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl CookError {
    pub(crate) fn inventory(err: anyhow::Error) -> Self {
        Self::InventoryUpdate(err.into())
    }
}

/// New state for one inventory record after a cook event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeductionUpdate {
    pub record_id: i64,
    pub taxonomy_id: i64,
    pub deducted: f64,
    pub new_quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineDeduction {
    pub line_id: i64,
    pub taxonomy_id: i64,
    pub display_name: String,
    pub needed: f64,
    pub deducted: f64,
    /// Amount that could not be taken from inventory.
    pub shortfall: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CookReport {
    pub recipe_id: i64,
    pub servings: f64,
    pub updates: Vec<DeductionUpdate>,
    pub lines: Vec<LineDeduction>,
}

/// Accumulates deductions across all lines of one recipe before anything is written.
///
/// Working quantities are tracked per record, so two lines that draw on the same
/// record see each other's deductions.
#[derive(Debug, Default)]
pub struct DeductionPlan {
    working: HashMap<i64, f64>,
    updates: Vec<DeductionUpdate>,
    update_index: HashMap<i64, usize>,
    lines: Vec<LineDeduction>,
}

impl DeductionPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan one line against `records`, which must already be ordered soonest-expiring
    /// first with undated records last. Unlinked lines are skipped.
    pub fn deduct_line(
        &mut self,
        line: &IngredientLine,
        multiplier: f64,
        records: &[InventoryRecord],
    ) {
        let Some(taxonomy_id) = line.taxonomy_id else {
            return;
        };
        let per_serving = line.quantity.unwrap_or_else(|| {
            warn!(
                line_id = line.id,
                name = %line.display_name,
                "ingredient line has no usable quantity, skipping deduction"
            );
            0.0
        });
        let needed = (per_serving * multiplier).max(0.0);
        let mut remaining = needed;

        for record in records {
            if remaining <= EPSILON {
                break;
            }
            let available = self
                .working
                .entry(record.id)
                .or_insert_with(|| record.quantity.max(0.0));
            let take = remaining.min(*available);
            if take <= 0.0 {
                continue;
            }
            *available = (*available - take).max(0.0);
            remaining -= take;
            let new_quantity = *available;

            debug!(
                record_id = record.id,
                taxonomy_id, take, new_quantity, "planned deduction"
            );

            match self.update_index.get(&record.id) {
                Some(&i) => {
                    self.updates[i].deducted += take;
                    self.updates[i].new_quantity = new_quantity;
                }
                None => {
                    self.update_index.insert(record.id, self.updates.len());
                    self.updates.push(DeductionUpdate {
                        record_id: record.id,
                        taxonomy_id,
                        deducted: take,
                        new_quantity,
                    });
                }
            }
        }

        let shortfall = if remaining > EPSILON { remaining } else { 0.0 };
        if shortfall > 0.0 {
            warn!(
                line_id = line.id,
                taxonomy_id, needed, shortfall, "not enough inventory to cover line"
            );
        }
        self.lines.push(LineDeduction {
            line_id: line.id,
            taxonomy_id,
            display_name: line.display_name.clone(),
            needed,
            deducted: needed - remaining.max(0.0),
            shortfall,
        });
    }

    #[must_use]
    pub fn updates(&self) -> &[DeductionUpdate] {
        &self.updates
    }

    #[must_use]
    pub fn into_report(self, recipe_id: i64, servings: f64) -> CookReport {
        CookReport {
            recipe_id,
            servings,
            updates: self.updates,
            lines: self.lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn record(id: i64, quantity: f64, expires: Option<(i32, u32, u32)>) -> InventoryRecord {
        InventoryRecord {
            id,
            user_id: 1,
            household_id: None,
            taxonomy_id: 20,
            quantity,
            unit: "pcs".to_string(),
            location: "fridge".to_string(),
            expires_at: expires.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            created_at: String::new(),
            updated_at: String::new(),
            food_name: None,
        }
    }

    fn eggs(quantity: Option<f64>) -> IngredientLine {
        IngredientLine {
            id: 1,
            recipe_id: 1,
            position: 0,
            taxonomy_id: Some(20),
            display_name: "eggs".to_string(),
            quantity,
            unit: Some("pcs".to_string()),
            is_optional: false,
        }
    }

    #[test]
    fn test_soonest_expiring_record_drained_first() {
        let records = vec![
            record(1, 4.0, Some((2026, 1, 2))),
            record(2, 12.0, Some((2026, 1, 20))),
            record(3, 6.0, None),
        ];
        let mut plan = DeductionPlan::new();
        plan.deduct_line(&eggs(Some(3.0)), 2.0, &records);

        assert_eq!(
            plan.updates(),
            &[
                DeductionUpdate {
                    record_id: 1,
                    taxonomy_id: 20,
                    deducted: 4.0,
                    new_quantity: 0.0,
                },
                DeductionUpdate {
                    record_id: 2,
                    taxonomy_id: 20,
                    deducted: 2.0,
                    new_quantity: 10.0,
                },
            ]
        );
    }

    #[test]
    fn test_shortfall_never_goes_negative() {
        let records = vec![record(1, 2.0, None)];
        let mut plan = DeductionPlan::new();
        plan.deduct_line(&eggs(Some(5.0)), 1.0, &records);
        let report = plan.into_report(1, 1.0);
        assert_eq!(report.updates.len(), 1);
        assert!((report.updates[0].new_quantity - 0.0).abs() < f64::EPSILON);
        assert!((report.lines[0].shortfall - 3.0).abs() < 1e-9);
        assert!((report.lines[0].deducted - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_lines_share_working_quantity() {
        let records = vec![record(1, 5.0, None)];
        let mut plan = DeductionPlan::new();
        plan.deduct_line(&eggs(Some(3.0)), 1.0, &records);
        plan.deduct_line(&eggs(Some(3.0)), 1.0, &records);
        let updates = plan.updates();
        assert_eq!(updates.len(), 1);
        assert!((updates[0].deducted - 5.0).abs() < 1e-9);
        assert!((updates[0].new_quantity - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_quantity_deducts_nothing() {
        let records = vec![record(1, 5.0, None)];
        let mut plan = DeductionPlan::new();
        plan.deduct_line(&eggs(None), 2.0, &records);
        assert!(plan.updates().is_empty());
    }

    #[test]
    fn test_unlinked_line_is_skipped() {
        let mut line = eggs(Some(1.0));
        line.taxonomy_id = None;
        let mut plan = DeductionPlan::new();
        plan.deduct_line(&line, 1.0, &[record(1, 5.0, None)]);
        let report = plan.into_report(1, 1.0);
        assert!(report.updates.is_empty());
        assert!(report.lines.is_empty());
    }

    #[test]
    fn test_cook_error_message_is_user_facing() {
        let err = CookError::inventory(anyhow::anyhow!("disk I/O error at page 7"));
        assert_eq!(err.to_string(), "could not update inventory");
    }
}
