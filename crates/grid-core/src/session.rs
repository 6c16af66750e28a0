//! Transient grid interactions: cell editing and column drag-resize
//!
//! [`CellEditSession`] owns the single draft the grid may hold. Entering
//! edit on a cell discards any uncommitted draft on another cell; drafts are
//! never committed implicitly.
//!
//! [`ColumnResizer`] turns a begin/move/end pointer sequence into
//! `ResizeColumn` operations, one per move.

use crate::error::{Error, Result};
use crate::mutation::Operation;
use crate::sheet::{CellValue, ColumnType, Sheet};
use crate::store::{Dispatch, PatchOutcome};
use tracing::debug;

/// The cell currently being edited and its draft text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEdit {
    pub row_id: String,
    pub column_id: String,
    pub draft: String,
}

/// Grid-wide edit state: Viewing when `active` is `None`, Editing otherwise
#[derive(Debug, Clone, Default)]
pub struct CellEditSession {
    active: Option<ActiveEdit>,
}

impl CellEditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The edit in progress, if any
    pub fn active(&self) -> Option<&ActiveEdit> {
        self.active.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.active.is_some()
    }

    /// Whether this particular cell is in the Editing state
    pub fn is_editing_cell(&self, row_id: &str, column_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.row_id == row_id && a.column_id == column_id)
    }

    /// Enter Editing on a cell, seeding the draft with its committed value.
    ///
    /// Checkbox cells and cells being enriched cannot be edited. An edit
    /// open on a different cell is cancelled first, even when the new cell
    /// turns out not to be editable.
    pub fn begin(&mut self, sheet: &Sheet, row_id: &str, column_id: &str) -> Result<()> {
        let column = sheet
            .find_column(column_id)
            .ok_or_else(|| Error::ColumnNotFound(column_id.to_string()))?;
        let row = sheet
            .find_row(row_id)
            .ok_or_else(|| Error::RowNotFound(row_id.to_string()))?;
        let cell = row.get(column_id);

        if self.is_editing_cell(row_id, column_id) {
            return Ok(());
        }
        if let Some(previous) = self.active.take() {
            debug!(
                row = %previous.row_id,
                column = %previous.column_id,
                "discarding uncommitted edit"
            );
        }

        if column.column_type == ColumnType::Checkbox {
            return Err(Error::NotEditable {
                reason: "checkbox cells are toggled directly".to_string(),
            });
        }
        if cell.is_some_and(|c| c.is_enriching) {
            return Err(Error::NotEditable {
                reason: "cell is being enriched".to_string(),
            });
        }

        self.active = Some(ActiveEdit {
            row_id: row_id.to_string(),
            column_id: column_id.to_string(),
            draft: cell.map(|c| c.value.to_string_value()).unwrap_or_default(),
        });
        Ok(())
    }

    /// Replace the draft text of the open edit
    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<()> {
        let active = self.active.as_mut().ok_or_else(not_editing)?;
        active.draft = text.into();
        Ok(())
    }

    /// Leave Editing and turn the draft into the `EditCell` that commits it
    pub fn finish(&mut self) -> Result<Operation> {
        let active = self.active.take().ok_or_else(not_editing)?;
        Ok(Operation::EditCell {
            row_id: active.row_id,
            column_id: active.column_id,
            raw_input: active.draft,
        })
    }

    /// Commit the draft through `EditCell` and return to Viewing
    pub fn commit<D: Dispatch + ?Sized>(&mut self, target: &mut D) -> Result<PatchOutcome> {
        let op = self.finish()?;
        target.dispatch(&op)
    }

    /// Discard the draft and return to Viewing
    pub fn cancel(&mut self) -> Option<ActiveEdit> {
        self.active.take()
    }

    /// The `EditCell` that flips a Checkbox cell, without entering Editing
    pub fn toggle_operation(
        &mut self,
        sheet: &Sheet,
        row_id: &str,
        column_id: &str,
    ) -> Result<Operation> {
        let column = sheet
            .find_column(column_id)
            .ok_or_else(|| Error::ColumnNotFound(column_id.to_string()))?;
        if column.column_type != ColumnType::Checkbox {
            return Err(Error::NotEditable {
                reason: format!("column '{}' is not a checkbox column", column.name),
            });
        }

        // Focus moved to another cell.
        self.active = None;

        let checked = matches!(
            sheet.cell(row_id, column_id).map(|c| &c.value),
            Some(CellValue::Bool(true))
        );
        Ok(Operation::edit_cell(row_id, column_id, (!checked).to_string()))
    }

    /// Flip a Checkbox cell through `EditCell`
    pub fn toggle_checkbox<D: Dispatch + ?Sized>(
        &mut self,
        sheet: &Sheet,
        target: &mut D,
        row_id: &str,
        column_id: &str,
    ) -> Result<PatchOutcome> {
        let op = self.toggle_operation(sheet, row_id, column_id)?;
        target.dispatch(&op)
    }

    /// Drop the open edit if its cell no longer exists in `sheet`
    pub fn sync(&mut self, sheet: &Sheet) {
        let gone = self
            .active
            .as_ref()
            .is_some_and(|a| sheet.cell(&a.row_id, &a.column_id).is_none());
        if gone {
            debug!("edited cell was removed, cancelling edit");
            self.active = None;
        }
    }
}

fn not_editing() -> Error {
    Error::NotEditable {
        reason: "no cell is being edited".to_string(),
    }
}

/// Pointer messages of a column drag-resize
#[derive(Debug, Clone, PartialEq)]
pub enum ResizeMessage {
    Begin { column_id: String, x: f64 },
    Move { x: f64 },
    End,
}

#[derive(Debug, Clone, PartialEq)]
struct ResizeDrag {
    column_id: String,
    start_x: f64,
    start_width: u32,
}

/// Tracks one drag-resize gesture at a time
#[derive(Debug, Clone, Default)]
pub struct ColumnResizer {
    drag: Option<ResizeDrag>,
}

impl ColumnResizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Feed one pointer message; every move yields a `ResizeColumn`
    pub fn handle(&mut self, sheet: &Sheet, message: ResizeMessage) -> Result<Option<Operation>> {
        match message {
            ResizeMessage::Begin { column_id, x } => {
                let column = sheet
                    .find_column(&column_id)
                    .ok_or_else(|| Error::ColumnNotFound(column_id.clone()))?;
                self.drag = Some(ResizeDrag {
                    start_width: column.width,
                    column_id,
                    start_x: x,
                });
                Ok(None)
            }
            ResizeMessage::Move { x } => Ok(self.drag.as_ref().map(|drag| {
                let width = f64::from(drag.start_width) + (x - drag.start_x);
                Operation::ResizeColumn {
                    column_id: drag.column_id.clone(),
                    width: width.round() as i64,
                }
            })),
            ResizeMessage::End => {
                self.drag = None;
                Ok(None)
            }
        }
    }
}
