/*!
# Report Dashboard

A small authenticated web dashboard that turns uploaded CSV files into PDF reports, built in Rust.

## Overview

A logged-in user uploads a CSV file (and optionally a logo image). The file is parsed into a
typed table, previewed, charted as a bar chart and composed into a PDF containing the logo,
a title, a generation timestamp, the chart and the full data table. Every generated report is
recorded in a SQLite history store, and a report can also be emailed as an attachment.
Administrators can inspect the report history and action log of every user.

## Architecture

### Frontend Layer
- **Technologies**: HTML, CSS, plain JavaScript
- **Key Components**:
  - Login page - Form posting credentials to the server
  - Dashboard - Upload form, preview table, chart, report and email buttons, history view

### Backend Layer
- **Technologies**: Rust, axum (behind the `web` feature)
- **Core Components**:
  - CSV Ingest - Parses uploads and infers numeric or text columns
  - Chart Renderer - Draws a bar chart PNG with plotters
  - Report Composer - Lays out and serializes the PDF with printpdf
  - Report Workflow - Per-session state machine tying the pieces together
  - Mail Dispatcher - Sends reports over SMTP with lettre

### Data Persistence Layer
- SQLite (`report_history` and `admin_logs` tables) through rusqlite

## Modules

- **table**: CSV ingest, column typing and preview
- **graph**: Bar chart selection and PNG rendering
- **report**: PDF layout and serialization
- **history**: Report history and action log storage
- **auth**: Roles, actors and argon2 credential verification
- **mailer**: SMTP report dispatch
- **config**: JSON configuration with environment overrides
- **workflow**: Session workflow (authenticate, ingest, generate, send)
- **error**: Error types for every stage
- **app**: Routing, sessions and handlers (feature `web`)

## REST API Endpoints

- `/login`, `/logout` - Session management
- `/api/upload` - Multipart CSV and logo upload, returns a preview
- `/api/chart` - Bar chart PNG for the current upload
- `/api/generate` - Builds and downloads the PDF report
- `/api/send` - Emails the report to a recipient
- `/api/export` - Downloads the current table as CSV
- `/api/history` - Reports generated by the current user
- `/api/admin/logs` - All reports and actions (admin only)
*/

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod mailer;
pub mod report;
pub mod table;
pub mod workflow;

#[cfg(feature = "web")]
pub mod app;

pub use auth::{Actor, CredentialTable, CredentialVerifier, Role};
pub use config::AppConfig;
pub use error::*;
pub use graph::{ChartOptions, ChartSpec};
pub use history::{ActionRecord, HistoryRecord, HistoryStore};
pub use mailer::{MailSettings, Mailer, ReportDispatcher};
pub use report::{ReportComposer, ReportDocument};
pub use table::{ColumnType, Preview, TabularModel};
pub use workflow::{GeneratedReport, ReportWorkflow, SessionState};
