//! Entity store holding the current sheet snapshot
//!
//! Every change goes through [`SheetStore::apply`]. A patch either replaces
//! the snapshot with a fully validated successor or leaves it untouched.

use crate::error::Result;
use crate::mutation::{self, ApplyContext, Operation};
use crate::sheet::Sheet;
use chrono::Utc;
use tracing::debug;

/// What happened to an operation handed to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The snapshot was replaced
    Applied,
    /// The operation referenced a missing row or column and was ignored
    Ignored { reason: String },
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied)
    }
}

/// Anything operations can be sent to
pub trait Dispatch {
    /// Apply one operation, synchronously and to completion
    fn dispatch(&mut self, op: &Operation) -> Result<PatchOutcome>;
}

/// Holds exactly one current sheet snapshot
#[derive(Debug, Clone)]
pub struct SheetStore {
    sheet: Sheet,
    default_column_width: u32,
}

impl SheetStore {
    /// Seed the store with a snapshot
    pub fn new(sheet: Sheet, default_column_width: u32) -> Self {
        Self {
            sheet,
            default_column_width,
        }
    }

    /// The current snapshot
    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    /// Apply an operation atomically.
    ///
    /// Missing references come back as [`PatchOutcome::Ignored`]; any other
    /// error rejects the operation and keeps the current snapshot.
    pub fn apply(&mut self, op: &Operation) -> Result<PatchOutcome> {
        let ctx = ApplyContext::new(Utc::now(), self.default_column_width);
        let next = match mutation::apply(&self.sheet, op, &ctx) {
            Ok(next) => next,
            Err(e) if e.is_missing_reference() => {
                debug!(op = op.kind(), reason = %e, "operation ignored");
                return Ok(PatchOutcome::Ignored {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        next.check_integrity()?;
        debug!(
            op = op.kind(),
            columns = next.column_count(),
            rows = next.row_count(),
            "operation applied"
        );
        self.sheet = next;
        Ok(PatchOutcome::Applied)
    }

    /// Swap in a whole snapshot, e.g. one loaded from storage
    pub fn replace(&mut self, sheet: Sheet) -> Result<()> {
        sheet.check_integrity()?;
        self.sheet = sheet;
        Ok(())
    }

    /// Take the snapshot out of the store
    pub fn into_sheet(self) -> Sheet {
        self.sheet
    }
}

impl Dispatch for SheetStore {
    fn dispatch(&mut self, op: &Operation) -> Result<PatchOutcome> {
        self.apply(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mutation::EnrichmentUpdate;
    use crate::sheet::{CellValue, ColumnType};
    use proptest::prelude::*;

    fn store() -> SheetStore {
        SheetStore::new(Sheet::seed("user_1", Utc::now()), 200)
    }

    #[test]
    fn test_applied_patch_stamps_updated_at() {
        let mut store = store();
        let before = store.sheet().updated_at;
        let outcome = store
            .apply(&Operation::RenameSheet {
                title: "Renamed".to_string(),
            })
            .unwrap();
        assert!(outcome.is_applied());
        assert!(store.sheet().updated_at >= before);
        assert_eq!(store.sheet().name, "Renamed");
    }

    #[test]
    fn test_missing_reference_is_ignored() {
        let mut store = store();
        let before = store.sheet().clone();
        let outcome = store
            .apply(&Operation::DeleteColumn {
                column_id: "col_missing".to_string(),
            })
            .unwrap();
        assert!(matches!(outcome, PatchOutcome::Ignored { .. }));
        assert_eq!(store.sheet(), &before);
    }

    #[test]
    fn test_rejected_patch_leaves_snapshot() {
        let mut store = store();
        let start = Operation::SetEnrichmentState {
            row_id: "row_1".to_string(),
            column_id: "col_email".to_string(),
            update: EnrichmentUpdate::start(),
        };
        store.apply(&start).unwrap();
        let before = store.sheet().clone();

        let err = store.apply(&start).unwrap_err();
        assert!(matches!(err, Error::EnrichmentAlreadyInProgress { .. }));
        assert_eq!(store.sheet(), &before);
    }

    #[test]
    fn test_replace_rejects_broken_snapshot() {
        let mut store = store();
        let mut broken = store.sheet().clone();
        broken.rows[1].id = "row_1".to_string();
        assert!(store.replace(broken).is_err());
        assert_eq!(store.sheet().rows[1].id, "row_2");
    }

    #[derive(Debug, Clone)]
    enum Step {
        Add(ColumnType),
        Delete(usize),
        Edit(usize, String),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            prop_oneof![
                Just(ColumnType::Text),
                Just(ColumnType::Number),
                Just(ColumnType::Checkbox),
                Just(ColumnType::Enrichment),
            ]
            .prop_map(Step::Add),
            (0usize..8).prop_map(Step::Delete),
            (0usize..8, "[a-z0-9.]{0,6}").prop_map(|(i, s)| Step::Edit(i, s)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn cell_keys_track_column_ids(steps in proptest::collection::vec(step_strategy(), 0..24)) {
            let mut store = store();
            for step in steps {
                let op = match step {
                    Step::Add(column_type) => Operation::add_column("c", column_type, None, None),
                    Step::Delete(i) => {
                        let columns = &store.sheet().columns;
                        let column_id = columns
                            .get(i % columns.len().max(1))
                            .map(|c| c.id.clone())
                            .unwrap_or_else(|| "col_gone".to_string());
                        Operation::DeleteColumn { column_id }
                    }
                    Step::Edit(i, raw) => {
                        let columns = &store.sheet().columns;
                        let column_id = columns
                            .get(i % columns.len().max(1))
                            .map(|c| c.id.clone())
                            .unwrap_or_else(|| "col_gone".to_string());
                        Operation::edit_cell("row_1", column_id, raw)
                    }
                };
                store.apply(&op).unwrap();

                let sheet = store.sheet();
                for row in &sheet.rows {
                    let mut keys: Vec<&String> = row.cells.keys().collect();
                    let mut ids: Vec<&String> = sheet.columns.iter().map(|c| &c.id).collect();
                    keys.sort();
                    ids.sort();
                    prop_assert_eq!(keys, ids);
                }
            }
        }

        #[test]
        fn resize_never_goes_below_floor(width in -500i64..2000) {
            let mut store = store();
            store.apply(&Operation::ResizeColumn { column_id: "col_name".to_string(), width }).unwrap();
            let stored = store.sheet().find_column("col_name").unwrap().width;
            if width < 120 {
                prop_assert_eq!(stored, 120);
            } else {
                prop_assert_eq!(i64::from(stored), width);
            }
        }
    }

    #[test]
    fn test_number_column_scenario() {
        let mut store = store();
        store
            .apply(&Operation::add_column("Score", ColumnType::Number, None, None))
            .unwrap();
        let score = store.sheet().columns[3].id.clone();

        store.apply(&Operation::edit_cell("row_1", &score, "42.5")).unwrap();
        assert_eq!(
            store.sheet().cell("row_1", &score).unwrap().value,
            CellValue::Number(42.5)
        );
        store.apply(&Operation::edit_cell("row_1", &score, "abc")).unwrap();
        assert_eq!(
            store.sheet().cell("row_1", &score).unwrap().value,
            CellValue::Number(0.0)
        );
    }
}
