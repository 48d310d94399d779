//! Delete, edit and insert flows.
//!
//! Each user action runs `Idle -> Confirming -> Applying -> Idle`, or ends in
//! `Failed` until the error is dismissed. The view is only changed after the
//! store reports success, so a failed action leaves it exactly as it was. Nothing
//! is retried.

use crate::db::{Row, Value};
use crate::error::{BrowseError, Result};
use crate::view::{RowHandle, TableView};

/// An action waiting for the user to confirm it.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    DeleteRow {
        handle: RowHandle,
        prior: Row,
    },
    EditCell {
        handle: RowHandle,
        column: usize,
        prior: Row,
        input: String,
    },
    AddRow {
        inputs: Vec<String>,
        focus: usize,
    },
}

impl PendingAction {
    pub fn push_char(&mut self, c: char) {
        if let Some(input) = self.focused_input_mut() {
            input.push(c);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(input) = self.focused_input_mut() {
            input.pop();
        }
    }

    /// Moves the add-row focus to the next column, wrapping around.
    pub fn next_field(&mut self) {
        if let PendingAction::AddRow { inputs, focus } = self
            && !inputs.is_empty()
        {
            *focus = (*focus + 1) % inputs.len();
        }
    }

    pub fn previous_field(&mut self) {
        if let PendingAction::AddRow { inputs, focus } = self
            && !inputs.is_empty()
        {
            *focus = (*focus + inputs.len() - 1) % inputs.len();
        }
    }

    fn focused_input_mut(&mut self) -> Option<&mut String> {
        match self {
            PendingAction::DeleteRow { .. } => None,
            PendingAction::EditCell { input, .. } => Some(input),
            PendingAction::AddRow { inputs, focus } => inputs.get_mut(*focus),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Confirming(PendingAction),
    Applying,
    Failed(String),
}

impl MutationState {
    fn name(&self) -> &'static str {
        match self {
            MutationState::Idle => "idle",
            MutationState::Confirming(_) => "confirming",
            MutationState::Applying => "applying",
            MutationState::Failed(_) => "showing an error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Deleted { affected: usize },
    Updated { affected: usize },
    Inserted(RowHandle),
}

#[derive(Debug, Default)]
pub struct MutationOrchestrator {
    state: MutationState,
}

impl MutationOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, MutationState::Idle)
    }

    pub fn pending_mut(&mut self) -> Option<&mut PendingAction> {
        match &mut self.state {
            MutationState::Confirming(action) => Some(action),
            _ => None,
        }
    }

    /// Starts a delete; the prior row values are kept for the confirmation prompt.
    pub fn request_delete(&mut self, view: &TableView, handle: RowHandle) -> Result<()> {
        self.expect_idle("delete a row")?;
        let prior = view.lookup(handle)?.clone();
        self.state = MutationState::Confirming(PendingAction::DeleteRow { handle, prior });
        Ok(())
    }

    /// Starts an edit with the current cell text as the input.
    pub fn request_edit(&mut self, view: &TableView, handle: RowHandle, column: usize) -> Result<()> {
        self.expect_idle("edit a cell")?;
        let prior = view.lookup(handle)?.clone();
        let input = prior
            .get(column)
            .map(Value::to_string)
            .ok_or_else(|| BrowseError::InvalidColumn {
                table: view.table().unwrap_or_default().to_string(),
                column: format!("#{}", column),
            })?;

        self.state = MutationState::Confirming(PendingAction::EditCell {
            handle,
            column,
            prior,
            input,
        });
        Ok(())
    }

    /// Starts an insert with one empty input per column, in column order.
    pub fn request_add(&mut self, view: &TableView) -> Result<()> {
        self.expect_idle("add a row")?;
        if view.table().is_none() || view.columns().is_empty() {
            return Err(BrowseError::InvalidTransition {
                action: "add a row",
                state: "no table is open",
            });
        }

        self.state = MutationState::Confirming(PendingAction::AddRow {
            inputs: vec![String::new(); view.columns().len()],
            focus: 0,
        });
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            MutationState::Confirming(_) => {
                self.state = MutationState::Idle;
                Ok(())
            }
            _ => Err(self.invalid("cancel")),
        }
    }

    /// Clears a failure so a new action can start.
    pub fn dismiss(&mut self) -> Result<()> {
        match self.state {
            MutationState::Failed(_) => {
                self.state = MutationState::Idle;
                Ok(())
            }
            _ => Err(self.invalid("dismiss")),
        }
    }

    /// Applies the pending action against the store, then updates the view.
    ///
    /// A store failure leaves the orchestrator in `Failed` with the message to show,
    /// and is also returned.
    pub async fn confirm(&mut self, view: &mut TableView) -> Result<MutationOutcome> {
        let action = match std::mem::replace(&mut self.state, MutationState::Applying) {
            MutationState::Confirming(action) => action,
            other => {
                self.state = other;
                return Err(self.invalid("confirm"));
            }
        };

        match apply(view, action).await {
            Ok(outcome) => {
                self.state = MutationState::Idle;
                Ok(outcome)
            }
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(error = %e, "mutation used stale state");
                } else {
                    tracing::warn!(error = %e, "mutation failed");
                }
                self.state = MutationState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn expect_idle(&self, action: &'static str) -> Result<()> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> BrowseError {
        BrowseError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }
}

async fn apply(view: &mut TableView, action: PendingAction) -> Result<MutationOutcome> {
    let table = view
        .table()
        .map(str::to_string)
        .ok_or(BrowseError::InvalidTransition {
            action: "confirm",
            state: "no table is open",
        })?;

    match action {
        PendingAction::DeleteRow { handle, prior } => {
            view.lookup(handle)?;
            let affected = view
                .gateway()
                .delete_row(&table, &prior, view.columns())
                .await?;
            view.remove_matching(handle, &prior, affected)?;
            Ok(MutationOutcome::Deleted { affected })
        }
        PendingAction::EditCell {
            handle,
            column,
            prior,
            input,
        } => {
            view.lookup(handle)?;
            let name = view
                .columns()
                .get(column)
                .map(|c| c.name.clone())
                .ok_or_else(|| BrowseError::InvalidColumn {
                    table: table.clone(),
                    column: format!("#{}", column),
                })?;
            let value = Value::from_input(&input);

            // the predicate is the row as it was before the edit
            let affected = view
                .gateway()
                .update_cell(&table, &prior, view.columns(), &name, value.clone())
                .await?;
            view.replace_matching(handle, &prior, column, value, affected)?;
            Ok(MutationOutcome::Updated { affected })
        }
        PendingAction::AddRow { inputs, .. } => {
            let values: Row = inputs.iter().map(|s| Value::from_input(s)).collect();
            let stored = view.gateway().insert_row(&table, &values).await?;
            Ok(MutationOutcome::Inserted(view.append_row(stored)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_gateway;

    async fn accounts_view(sql: &str) -> (tempfile::TempDir, TableView) {
        let (dir, gateway) = scratch_gateway(sql).await;
        let mut view = TableView::new(gateway, 50, true);
        view.open_table("accounts").await.unwrap();
        (dir, view)
    }

    const ONE_ACCOUNT: &str = "CREATE TABLE accounts (id INTEGER, name TEXT, note TEXT);
        INSERT INTO accounts VALUES (1, 'a', NULL);";

    fn snapshot(view: &TableView) -> Vec<(RowHandle, Row)> {
        view.rows().map(|(h, r)| (h, r.clone())).collect()
    }

    #[tokio::test]
    async fn test_delete_flow() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let handle = view.handle_at(0).unwrap();
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_delete(&view, handle).unwrap();
        match orchestrator.state() {
            MutationState::Confirming(PendingAction::DeleteRow { prior, .. }) => {
                assert_eq!(prior, &vec![Value::Integer(1), Value::from("a"), Value::Null]);
            }
            other => panic!("unexpected state {:?}", other),
        }

        let outcome = orchestrator.confirm(&mut view).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Deleted { affected: 1 });
        assert!(orchestrator.is_idle());
        assert!(view.is_empty());
        assert!(view.lookup(handle).is_err());
        assert_eq!(view.gateway().row_count("accounts").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_does_not_touch_store() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let handle = view.handle_at(0).unwrap();
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_delete(&view, handle).unwrap();
        orchestrator.cancel().unwrap();

        assert!(orchestrator.is_idle());
        assert_eq!(view.len(), 1);
        assert_eq!(view.gateway().row_count("accounts").await.unwrap(), 1);
        assert!(orchestrator.confirm(&mut view).await.is_err());
        assert!(orchestrator.is_idle());
    }

    #[tokio::test]
    async fn test_edit_cell_updates_view_and_store() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let handle = view.handle_at(0).unwrap();
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_edit(&view, handle, 2).unwrap();
        let pending = orchestrator.pending_mut().unwrap();
        match &*pending {
            PendingAction::EditCell { input, .. } => assert_eq!(input, "NULL"),
            other => panic!("unexpected action {:?}", other),
        }
        for _ in 0..4 {
            pending.pop_char();
        }
        "paid".chars().for_each(|c| pending.push_char(c));

        let outcome = orchestrator.confirm(&mut view).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Updated { affected: 1 });

        let expected = vec![Value::Integer(1), Value::from("a"), Value::from("paid")];
        assert_eq!(view.lookup(handle).unwrap(), &expected);
        let (rows, _) = view.gateway().fetch_all("accounts").await.unwrap();
        assert_eq!(rows, vec![expected]);
    }

    #[tokio::test]
    async fn test_second_edit_uses_rebound_row() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let handle = view.handle_at(0).unwrap();
        let mut orchestrator = MutationOrchestrator::new();

        for text in ["b", "c"] {
            orchestrator.request_edit(&view, handle, 1).unwrap();
            let pending = orchestrator.pending_mut().unwrap();
            pending.pop_char();
            pending.push_char(text.chars().next().unwrap());
            orchestrator.confirm(&mut view).await.unwrap();
        }

        let (rows, _) = view.gateway().fetch_all("accounts").await.unwrap();
        assert_eq!(rows[0][1], Value::from("c"));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_view_unchanged() {
        let (_dir, mut view) = accounts_view(
            "CREATE TABLE accounts (id INTEGER, name TEXT NOT NULL, note TEXT);
             INSERT INTO accounts VALUES (1, 'a', NULL), (2, 'b', 'x');",
        )
        .await;
        let handle = view.handle_at(1).unwrap();
        let before = snapshot(&view);
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_edit(&view, handle, 1).unwrap();
        let pending = orchestrator.pending_mut().unwrap();
        pending.pop_char();
        "NULL".chars().for_each(|c| pending.push_char(c));

        let err = orchestrator.confirm(&mut view).await.unwrap_err();
        assert!(matches!(err, BrowseError::Mutation(_)));
        assert!(matches!(orchestrator.state(), MutationState::Failed(msg) if msg.contains("NOT NULL")));
        assert_eq!(snapshot(&view), before);
        assert!(view.lookup(handle).is_ok());

        assert!(orchestrator.request_delete(&view, handle).is_err());
        orchestrator.dismiss().unwrap();
        assert!(orchestrator.is_idle());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_handle() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let handle = view.handle_at(0).unwrap();

        // someone else removed the row behind our back
        let path = view.gateway().path().to_path_buf();
        rusqlite::Connection::open(path)
            .unwrap()
            .execute("DELETE FROM accounts", [])
            .unwrap();

        let before = snapshot(&view);
        let mut orchestrator = MutationOrchestrator::new();
        orchestrator.request_delete(&view, handle).unwrap();
        assert!(orchestrator.confirm(&mut view).await.is_err());

        assert_eq!(snapshot(&view), before);
        assert!(view.lookup(handle).is_ok());
    }

    #[tokio::test]
    async fn test_add_row_appends_and_binds() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_add(&view).unwrap();
        let pending = orchestrator.pending_mut().unwrap();
        pending.push_char('2');
        pending.next_field();
        pending.push_char('z');
        pending.next_field();
        "NULL".chars().for_each(|c| pending.push_char(c));
        pending.next_field();
        pending.previous_field();

        let outcome = orchestrator.confirm(&mut view).await.unwrap();
        let MutationOutcome::Inserted(handle) = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };

        assert_eq!(view.len(), 2);
        assert_eq!(view.row_count(), 2);
        // the handle holds the stored row, with "2" converted by INTEGER affinity
        assert_eq!(
            view.lookup(handle).unwrap(),
            &vec![Value::Integer(2), Value::from("z"), Value::Null]
        );

        view.refresh().await.unwrap();
        let rows: Vec<Row> = view.rows().map(|(_, r)| r.clone()).collect();
        assert!(rows.contains(&vec![Value::Integer(2), Value::from("z"), Value::Null]));
    }

    #[tokio::test]
    async fn test_added_row_with_assigned_rowid_can_be_deleted() {
        let (_dir, mut view) = accounts_view(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT, note TEXT);
             INSERT INTO accounts VALUES (1, 'a', NULL);",
        )
        .await;
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_add(&view).unwrap();
        let pending = orchestrator.pending_mut().unwrap();
        "NULL".chars().for_each(|c| pending.push_char(c));
        pending.next_field();
        pending.push_char('z');
        pending.next_field();
        "NULL".chars().for_each(|c| pending.push_char(c));

        let MutationOutcome::Inserted(handle) = orchestrator.confirm(&mut view).await.unwrap() else {
            panic!("expected an insert");
        };
        assert_eq!(
            view.lookup(handle).unwrap(),
            &vec![Value::Integer(2), Value::from("z"), Value::Null]
        );

        orchestrator.request_delete(&view, handle).unwrap();
        let outcome = orchestrator.confirm(&mut view).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Deleted { affected: 1 });
        assert_eq!(view.gateway().row_count("accounts").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_view_unchanged() {
        let (_dir, mut view) = accounts_view(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT, note TEXT);
             INSERT INTO accounts VALUES (1, 'a', NULL);",
        )
        .await;
        let before = snapshot(&view);
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator.request_add(&view).unwrap();
        orchestrator.pending_mut().unwrap().push_char('1');
        assert!(orchestrator.confirm(&mut view).await.is_err());

        assert_eq!(snapshot(&view), before);
        assert_eq!(view.row_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_duplicate_removes_all_matches() {
        let (_dir, mut view) = accounts_view(
            "CREATE TABLE accounts (id INTEGER, name TEXT, note TEXT);
             INSERT INTO accounts VALUES (1, 'a', NULL), (2, 'b', NULL), (1, 'a', NULL);",
        )
        .await;
        let mut orchestrator = MutationOrchestrator::new();

        orchestrator
            .request_delete(&view, view.handle_at(0).unwrap())
            .unwrap();
        let outcome = orchestrator.confirm(&mut view).await.unwrap();

        assert_eq!(outcome, MutationOutcome::Deleted { affected: 2 });
        assert_eq!(view.len(), 1);
        assert_eq!(view.row_count(), 1);
        assert_eq!(view.gateway().row_count("accounts").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_is_rejected() {
        let (_dir, mut view) = accounts_view(ONE_ACCOUNT).await;
        let handle = view.handle_at(0).unwrap();
        view.refresh().await.unwrap();

        let mut orchestrator = MutationOrchestrator::new();
        let err = orchestrator.request_delete(&view, handle).unwrap_err();
        assert!(matches!(err, BrowseError::UnknownHandle(_)));
        assert!(orchestrator.is_idle());
    }
}
