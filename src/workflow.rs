use crate::auth::{Actor, CredentialVerifier};
use crate::error::{AuthError, ComposeError, DispatchError, WorkflowError};
use crate::graph::{self, ChartOptions};
use crate::history::{ActionRecord, HistoryRecord, HistoryStore};
use crate::mailer::ReportDispatcher;
use crate::report::ReportComposer;
use crate::table::{Preview, TabularModel};
use chrono::{Local, Utc};
use log::{info, warn};
use std::sync::Arc;

/// Notice shown when a table has nothing to plot
pub const NO_NUMERIC_NOTICE: &str = "No numeric data available to generate a chart.";

/// Where a session is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    /// An action is running; no other action is accepted until it finishes
    Busy,
}

/// A composed report ready for download
#[derive(Clone, Debug)]
pub struct GeneratedReport {
    pub file_name: String,
    pub document: Vec<u8>,
    /// Non-fatal advisories, e.g. a skipped chart
    pub notices: Vec<String>,
}

/// Chart for the dashboard view
#[derive(Clone, Debug)]
pub struct ChartView {
    pub png: Option<Vec<u8>>,
    pub notice: Option<String>,
}

/// Outcome of a successful email dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub file_name: String,
    pub recipient: String,
}

/// One user's session: authentication, the current upload and report actions
///
/// The workflow owns at most one current table. `generate` and `send`
/// without one are no-ops returning `Ok(None)`. Every error is scoped to the
/// action that raised it; the session keeps its previous state.
pub struct ReportWorkflow {
    verifier: Arc<dyn CredentialVerifier>,
    store: HistoryStore,
    dispatcher: Option<Arc<dyn ReportDispatcher>>,
    composer: ReportComposer,
    chart_options: ChartOptions,

    state: SessionState,
    actor: Option<Actor>,
    model: Option<TabularModel>,
    source_name: Option<String>,
    logo: Option<Vec<u8>>,
    // Reused by `send` until the table or logo changes
    last_report: Option<GeneratedReport>,
}

impl ReportWorkflow {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, store: HistoryStore) -> Self {
        Self {
            verifier,
            store,
            dispatcher: None,
            composer: ReportComposer::default(),
            chart_options: ChartOptions::default(),
            state: SessionState::Anonymous,
            actor: None,
            model: None,
            source_name: None,
            logo: None,
            last_report: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ReportDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_composer(mut self, composer: ReportComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_chart_options(mut self, options: ChartOptions) -> Self {
        self.chart_options = options;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    pub fn current_model(&self) -> Option<&TabularModel> {
        self.model.as_ref()
    }

    /// Name of the file the current table came from
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn has_logo(&self) -> bool {
        self.logo.is_some()
    }

    /// Log in
    ///
    /// On success the session becomes `Authenticated` as the verified
    /// identity. On failure the session keeps whatever state it had.
    ///
    /// # Errors
    /// * `AuthError::InvalidCredentials` if the verifier rejects the pair
    pub fn authenticate(&mut self, id: &str, secret: &str) -> Result<&Actor, WorkflowError> {
        if self.state == SessionState::Busy {
            return Err(WorkflowError::Busy);
        }
        if !self.verifier.verify(id, secret) {
            warn!("Rejected login for '{}'", id);
            return Err(AuthError::InvalidCredentials.into());
        }

        let actor = Actor::new(id, self.verifier.role(id));
        self.store.log_action(&actor.id, "Logged in", Utc::now())?;
        info!("'{}' logged in as {:?}", actor.id, actor.role);

        if self.actor.as_ref().is_some_and(|a| a.id != actor.id) {
            self.clear_upload();
        }
        self.state = SessionState::Authenticated;
        Ok(&*self.actor.insert(actor))
    }

    /// Log out, dropping the current table and logo
    pub fn logout(&mut self) {
        if let Some(actor) = self.actor.take() {
            info!("'{}' logged out", actor.id);
        }
        self.clear_upload();
        self.state = SessionState::Anonymous;
    }

    fn clear_upload(&mut self) {
        self.model = None;
        self.source_name = None;
        self.logo = None;
        self.last_report = None;
    }

    fn require_actor(&self) -> Result<Actor, WorkflowError> {
        match self.state {
            SessionState::Busy => Err(WorkflowError::Busy),
            SessionState::Anonymous => Err(AuthError::NotAuthenticated.into()),
            SessionState::Authenticated => self
                .actor
                .clone()
                .ok_or_else(|| AuthError::NotAuthenticated.into()),
        }
    }

    fn require_admin(&self) -> Result<Actor, WorkflowError> {
        let actor = self.require_actor()?;
        if !actor.is_admin() {
            return Err(AuthError::Forbidden.into());
        }
        Ok(actor)
    }

    /// Run one action in the `Busy` state, returning to `Authenticated` afterwards
    fn busy<T>(
        &mut self,
        action: impl FnOnce(&mut Self) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        self.state = SessionState::Busy;
        let result = action(self);
        self.state = SessionState::Authenticated;
        result
    }

    /// Replace the current table with an uploaded CSV file
    ///
    /// A file that fails to parse leaves the previous table in place.
    ///
    /// # Errors
    /// * `WorkflowError::Parse` for malformed input
    /// * `WorkflowError::History` if the upload cannot be logged
    pub fn ingest_file(&mut self, name: &str, bytes: &[u8]) -> Result<&TabularModel, WorkflowError> {
        let actor = self.require_actor()?;
        let model = TabularModel::ingest(bytes)?;

        self.store
            .log_action(&actor.id, &format!("Uploaded {}", name), Utc::now())?;
        info!(
            "'{}' uploaded {} ({} columns, {} rows)",
            actor.id,
            name,
            model.column_count(),
            model.row_count()
        );

        self.source_name = Some(name.to_string());
        self.last_report = None;
        Ok(&*self.model.insert(model))
    }

    /// Set the logo printed at the top of reports
    ///
    /// # Errors
    /// * `WorkflowError::Compose` if the bytes are not a readable image
    pub fn set_logo(&mut self, bytes: &[u8]) -> Result<(), WorkflowError> {
        self.require_actor()?;
        image::load_from_memory(bytes).map_err(|e| ComposeError::Image {
            role: "logo",
            reason: e.to_string(),
        })?;

        self.logo = Some(bytes.to_vec());
        self.last_report = None;
        Ok(())
    }

    pub fn clear_logo(&mut self) {
        self.logo = None;
        self.last_report = None;
    }

    /// First rows of the current table, if any
    pub fn preview(&self, limit: usize) -> Result<Option<Preview>, WorkflowError> {
        self.require_actor()?;
        Ok(self.model.as_ref().map(|m| m.preview(limit)))
    }

    /// Chart of the current table for on-screen display
    pub fn chart(&self) -> Result<Option<ChartView>, WorkflowError> {
        self.require_actor()?;
        let Some(model) = self.model.as_ref() else {
            return Ok(None);
        };

        let png = graph::render(model, &self.chart_options)?;
        let notice = png.is_none().then(|| NO_NUMERIC_NOTICE.to_string());
        Ok(Some(ChartView { png, notice }))
    }

    /// The current table as CSV, unchanged
    pub fn export_csv(&self) -> Result<Option<String>, WorkflowError> {
        self.require_actor()?;
        match self.model.as_ref() {
            Some(model) => Ok(Some(model.to_csv()?)),
            None => Ok(None),
        }
    }

    /// Build the report for the current table
    fn compose_current(&self, actor: &Actor) -> Result<GeneratedReport, WorkflowError> {
        let model = self.model.as_ref().ok_or(ComposeError::EmptyModel)?;
        let mut notices = Vec::new();

        let chart = match graph::render(model, &self.chart_options) {
            Ok(Some(png)) => Some(png),
            Ok(None) => {
                notices.push(NO_NUMERIC_NOTICE.to_string());
                None
            }
            Err(e) => {
                warn!("Chart skipped for '{}': {}", actor.id, e);
                notices.push(format!("Chart could not be drawn: {}", e));
                None
            }
        };

        let document = self
            .composer
            .compose(model, chart.as_deref(), self.logo.as_deref())?;

        Ok(GeneratedReport {
            file_name: format!(
                "{}_report_{}.pdf",
                actor.id,
                Local::now().format("%Y%m%d%H%M%S")
            ),
            document,
            notices,
        })
    }

    /// Compose a report from the current table and record it
    ///
    /// # Returns
    /// * `Ok(Some(report))` - The PDF, ready for download
    /// * `Ok(None)` - No table has been uploaded; nothing was done
    ///
    /// # Errors
    /// * `WorkflowError::Compose` if the document cannot be built
    /// * `WorkflowError::History` if the record cannot be written
    pub fn generate(&mut self) -> Result<Option<GeneratedReport>, WorkflowError> {
        let actor = self.require_actor()?;
        if self.model.is_none() {
            info!("'{}' asked for a report with no data uploaded", actor.id);
            return Ok(None);
        }

        self.busy(|session| {
            let report = session.compose_current(&actor)?;
            let now = Utc::now();
            session.store.append_with_action(
                &actor.id,
                &report.file_name,
                "Generated PDF report",
                now,
            )?;
            info!("'{}' generated {}", actor.id, report.file_name);

            session.last_report = Some(report.clone());
            Ok(Some(report))
        })
    }

    /// Email the report for the current table
    ///
    /// Reuses the last generated report while the table and logo are
    /// unchanged, otherwise composes a fresh one. One dispatch attempt is
    /// made. Success adds a history record; success and failure both go to
    /// the activity log.
    ///
    /// # Returns
    /// * `Ok(Some(receipt))` - The email was accepted by the relay
    /// * `Ok(None)` - No table has been uploaded; nothing was done
    ///
    /// # Errors
    /// * `WorkflowError::Dispatch` if no mailer is configured or sending fails
    pub fn send(&mut self, recipient: &str) -> Result<Option<SendReceipt>, WorkflowError> {
        let actor = self.require_actor()?;
        if self.model.is_none() {
            info!("'{}' asked to email a report with no data uploaded", actor.id);
            return Ok(None);
        }
        let dispatcher = self
            .dispatcher
            .clone()
            .ok_or(DispatchError::NotConfigured)?;

        self.busy(|session| {
            let report = match session.last_report.clone() {
                Some(report) => report,
                None => {
                    let report = session.compose_current(&actor)?;
                    session.last_report = Some(report.clone());
                    report
                }
            };

            let now = Utc::now();
            match dispatcher.dispatch(recipient, &report.file_name, &report.document) {
                Ok(()) => {
                    session.store.append_with_action(
                        &actor.id,
                        &format!("{} (emailed to {})", report.file_name, recipient),
                        &format!("Emailed report to {}", recipient),
                        now,
                    )?;
                    Ok(Some(SendReceipt {
                        file_name: report.file_name,
                        recipient: recipient.to_string(),
                    }))
                }
                Err(e) => {
                    warn!("'{}' failed to email {}: {}", actor.id, recipient, e);
                    session.store.log_action(
                        &actor.id,
                        &format!("Failed to email report to {}: {}", recipient, e),
                        now,
                    )?;
                    Err(e.into())
                }
            }
        })
    }

    /// Reports generated or sent by the logged-in user
    pub fn my_history(&self) -> Result<Vec<HistoryRecord>, WorkflowError> {
        let actor = self.require_actor()?;
        Ok(self.store.query_by_actor(&actor.id)?)
    }

    /// Reports of every user; admin only
    pub fn admin_history(&self) -> Result<Vec<HistoryRecord>, WorkflowError> {
        let actor = self.require_admin()?;
        Ok(self.store.query_all(&actor)?)
    }

    /// The activity log of every user; admin only
    pub fn admin_logs(&self) -> Result<Vec<ActionRecord>, WorkflowError> {
        let actor = self.require_admin()?;
        Ok(self.store.actions(&actor)?)
    }
}
