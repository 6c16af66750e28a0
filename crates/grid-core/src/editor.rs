//! Editor facade tying the store, the edit session and persistence together
//!
//! Every applied operation is saved through the gateway. A failed save is
//! reported as a notice and never rolls back the in-memory snapshot. After a
//! failed load nothing is saved, so the stored document is left as it was.

use crate::config::GridConfig;
use crate::error::Result;
use crate::export;
use crate::import::{ImportPipeline, ImportSummary};
use crate::mutation::{enrichment_targets, EnrichmentTarget, Operation};
use crate::persistence::PersistenceGateway;
use crate::session::{CellEditSession, ColumnResizer, ResizeMessage};
use crate::sheet::{ColumnType, EnrichmentType, Sheet};
use crate::store::{Dispatch, PatchOutcome, SheetStore};
use chrono::Utc;
use tracing::{info, warn};

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A non-blocking message for the host to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// One owner's sheet, open for editing
pub struct SheetEditor<G: PersistenceGateway> {
    store: SheetStore,
    gateway: G,
    session: CellEditSession,
    resizer: ColumnResizer,
    notices: Vec<Notice>,
    read_only: bool,
}

impl<G: PersistenceGateway> SheetEditor<G> {
    /// Load the owner's sheet, seeding a new one when nothing is stored.
    ///
    /// A load failure leaves the editor read-only on a seed sheet.
    pub fn open(gateway: G, config: &GridConfig) -> Self {
        let mut notices = Vec::new();
        let owner_id = config.owner_id.as_str();

        let mut read_only = false;
        let (sheet, fresh) = match gateway.load(owner_id) {
            Ok(Some(sheet)) => {
                info!(owner = owner_id, rows = sheet.row_count(), "sheet loaded");
                (sheet, false)
            }
            Ok(None) => {
                info!(owner = owner_id, "no stored sheet, seeding");
                (Sheet::seed(owner_id, Utc::now()), true)
            }
            Err(e) => {
                warn!(owner = owner_id, error = %e, "failed to load sheet");
                notices.push(Notice::error("Failed to load spreadsheet"));
                read_only = true;
                (Sheet::seed(owner_id, Utc::now()), false)
            }
        };

        let mut editor = Self {
            store: SheetStore::new(sheet, config.default_column_width),
            gateway,
            session: CellEditSession::new(),
            resizer: ColumnResizer::new(),
            notices,
            read_only,
        };
        if fresh {
            editor.persist();
        }
        editor
    }

    /// The current snapshot
    pub fn sheet(&self) -> &Sheet {
        self.store.sheet()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Whether changes stay in memory because the stored sheet failed to load
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn session(&self) -> &CellEditSession {
        &self.session
    }

    /// Take all notices recorded since the last call
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        enrichment_type: Option<EnrichmentType>,
        custom_prompt: Option<String>,
    ) -> Result<PatchOutcome> {
        self.dispatch(&Operation::add_column(
            name,
            column_type,
            enrichment_type,
            custom_prompt,
        ))
    }

    pub fn rename(&mut self, title: impl Into<String>) -> Result<PatchOutcome> {
        self.dispatch(&Operation::RenameSheet {
            title: title.into(),
        })
    }

    pub fn delete_column(&mut self, column_id: &str) -> Result<PatchOutcome> {
        self.dispatch(&Operation::DeleteColumn {
            column_id: column_id.to_string(),
        })
    }

    pub fn begin_edit(&mut self, row_id: &str, column_id: &str) -> Result<()> {
        self.session.begin(self.store.sheet(), row_id, column_id)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<()> {
        self.session.set_draft(text)
    }

    pub fn commit_edit(&mut self) -> Result<PatchOutcome> {
        let op = self.session.finish()?;
        self.dispatch(&op)
    }

    pub fn cancel_edit(&mut self) {
        self.session.cancel();
    }

    pub fn toggle_checkbox(&mut self, row_id: &str, column_id: &str) -> Result<PatchOutcome> {
        let op = self
            .session
            .toggle_operation(self.store.sheet(), row_id, column_id)?;
        self.dispatch(&op)
    }

    /// Feed a drag-resize pointer message; moves resize the column immediately
    pub fn resize(&mut self, message: ResizeMessage) -> Result<Option<PatchOutcome>> {
        match self.resizer.handle(self.store.sheet(), message)? {
            Some(op) => self.dispatch(&op).map(Some),
            None => Ok(None),
        }
    }

    /// Confirm an import pipeline against this sheet
    pub fn import<F: FnMut(u8)>(
        &mut self,
        pipeline: &mut ImportPipeline,
        on_progress: F,
    ) -> Result<ImportSummary> {
        pipeline.confirm(self, on_progress)
    }

    pub fn enrichment_targets(&self, column_id: &str) -> Vec<EnrichmentTarget> {
        enrichment_targets(self.store.sheet(), column_id)
    }

    pub fn export_csv(&self) -> String {
        export::export_csv(self.store.sheet())
    }

    fn persist(&mut self) {
        if self.read_only {
            warn!(owner = %self.store.sheet().owner_id, "stored sheet failed to load, not saving");
            return;
        }
        if let Err(e) = self.gateway.save(self.store.sheet()) {
            warn!(error = %e, "failed to save sheet");
            self.notices.push(Notice::error("Failed to save changes"));
        }
    }

    fn success_notice(&self, op: &Operation) -> Option<Notice> {
        match op {
            Operation::AddColumn { name, .. } => {
                Some(Notice::success(format!("Column \"{}\" added", name)))
            }
            Operation::DeleteColumn { .. } => Some(Notice::success("Column deleted")),
            Operation::Import { data, .. } => {
                Some(Notice::success(format!("Imported {} rows", data.rows.len())))
            }
            _ => None,
        }
    }
}

impl<G: PersistenceGateway> Dispatch for SheetEditor<G> {
    fn dispatch(&mut self, op: &Operation) -> Result<PatchOutcome> {
        let outcome = self.store.apply(op)?;
        if outcome.is_applied() {
            self.session.sync(self.store.sheet());
            self.persist();
            if let Some(notice) = self.success_notice(op) {
                self.notices.push(notice);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::persistence::MemoryGateway;
    use crate::sheet::CellValue;

    fn config() -> GridConfig {
        GridConfig {
            owner_id: "user_1".to_string(),
            ..GridConfig::default()
        }
    }

    #[test]
    fn test_open_seeds_and_saves() {
        let editor = SheetEditor::open(MemoryGateway::new(), &config());
        assert_eq!(editor.sheet().name, "My Spreadsheet");
        assert_eq!(editor.gateway().save_count(), 1);
        assert!(editor.gateway().stored("user_1").is_some());
    }

    #[test]
    fn test_open_loads_stored_sheet() {
        let mut stored = Sheet::seed("user_1", Utc::now());
        stored.name = "Leads".to_string();
        let editor = SheetEditor::open(MemoryGateway::with_sheet(stored), &config());
        assert_eq!(editor.sheet().name, "Leads");
        assert_eq!(editor.gateway().save_count(), 0);
    }

    #[test]
    fn test_every_applied_operation_is_saved() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        editor.rename("Renamed").unwrap();
        editor.begin_edit("row_1", "col_name").unwrap();
        editor.set_draft("Johnny").unwrap();
        editor.commit_edit().unwrap();

        assert_eq!(editor.gateway().save_count(), 3);
        let stored = editor.gateway().stored("user_1").unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(
            stored.cell("row_1", "col_name").unwrap().value,
            CellValue::Text("Johnny".to_string())
        );
    }

    #[test]
    fn test_ignored_operation_is_not_saved() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        let outcome = editor.delete_column("col_missing").unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(editor.gateway().save_count(), 1);
        assert!(editor.drain_notices().is_empty());
    }

    #[test]
    fn test_save_failure_keeps_change_and_notifies() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        editor.drain_notices();

        editor.gateway_mut().set_fail_saves(true);

        editor.rename("Offline").unwrap();
        assert_eq!(editor.sheet().name, "Offline");
        assert_eq!(
            editor.drain_notices(),
            vec![Notice::error("Failed to save changes")]
        );
    }

    #[test]
    fn test_column_notices() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        editor
            .add_column("Score", ColumnType::Number, None, None)
            .unwrap();
        editor.delete_column("col_email").unwrap();
        let messages: Vec<String> = editor
            .drain_notices()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(messages, vec!["Column \"Score\" added", "Column deleted"]);
    }

    #[test]
    fn test_delete_column_cancels_edit_on_it() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        editor.begin_edit("row_1", "col_email").unwrap();
        editor.delete_column("col_email").unwrap();
        assert!(!editor.session().is_editing());
    }

    #[test]
    fn test_toggle_checkbox() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        editor
            .add_column("Done", ColumnType::Checkbox, None, None)
            .unwrap();
        let done = editor.sheet().columns[3].id.clone();
        editor.toggle_checkbox("row_1", &done).unwrap();
        assert_eq!(
            editor.sheet().cell("row_1", &done).unwrap().value,
            CellValue::Bool(true)
        );
        assert!(matches!(
            editor.begin_edit("row_1", &done),
            Err(Error::NotEditable { .. })
        ));
    }

    #[test]
    fn test_resize_through_editor() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        editor
            .resize(ResizeMessage::Begin {
                column_id: "col_email".to_string(),
                x: 100.0,
            })
            .unwrap();
        let outcome = editor.resize(ResizeMessage::Move { x: 60.4 }).unwrap();
        assert_eq!(outcome, Some(PatchOutcome::Applied));
        assert_eq!(editor.sheet().find_column("col_email").unwrap().width, 210);
        assert_eq!(editor.resize(ResizeMessage::End).unwrap(), None);
    }

    #[test]
    fn test_import_notice() {
        let mut editor = SheetEditor::open(MemoryGateway::new(), &config());
        let mut pipeline = ImportPipeline::new(&config());
        pipeline
            .upload("people.csv", b"Name,Email\nAlice,a@x.com\nBob,b@x.com")
            .unwrap();
        let summary = editor.import(&mut pipeline, |_| {}).unwrap();
        assert_eq!(summary.rows_imported, 2);
        assert!(editor
            .drain_notices()
            .contains(&Notice::success("Imported 2 rows")));
        assert_eq!(editor.gateway().stored("user_1").unwrap().row_count(), 2);
    }
}
