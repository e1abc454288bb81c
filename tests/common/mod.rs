#![allow(dead_code)]

use report_dashboard::auth::{CredentialVerifier, Role};
use report_dashboard::error::DispatchError;
use report_dashboard::history::HistoryStore;
use report_dashboard::mailer::ReportDispatcher;
use report_dashboard::workflow::ReportWorkflow;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SCORES_CSV: &[u8] = b"name,score\nA,10\nB,20\n";

/// Throwaway database directory plus the store living in it
pub struct TestEnv {
    _tmp: TempDir,
    pub store: HistoryStore,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let store = HistoryStore::open(tmp.path().join("db").join("history.db"))
            .expect("open history store");
        Self { _tmp: tmp, store }
    }

    pub fn workflow(&self) -> ReportWorkflow {
        ReportWorkflow::new(Arc::new(StaticVerifier::default()), self.store.clone())
    }

    pub fn workflow_with(&self, dispatcher: Arc<RecordingDispatcher>) -> ReportWorkflow {
        self.workflow().with_dispatcher(dispatcher)
    }
}

/// Plaintext credentials: admin/admin123 and user/user123
pub struct StaticVerifier {
    users: HashMap<&'static str, (&'static str, Role)>,
}

impl Default for StaticVerifier {
    fn default() -> Self {
        let mut users = HashMap::new();
        users.insert("admin", ("admin123", Role::Admin));
        users.insert("user", ("user123", Role::User));
        users.insert("alice", ("alice123", Role::User));
        Self { users }
    }
}

impl CredentialVerifier for StaticVerifier {
    fn verify(&self, id: &str, secret: &str) -> bool {
        self.users.get(id).is_some_and(|(s, _)| *s == secret)
    }

    fn role(&self, id: &str) -> Role {
        self.users.get(id).map(|(_, r)| *r).unwrap_or_default()
    }
}

/// Dispatcher that records every attempt instead of sending email
#[derive(Default)]
pub struct RecordingDispatcher {
    pub fail: bool,
    pub sent: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().expect("sent list").len()
    }
}

impl ReportDispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        recipient: &str,
        file_name: &str,
        document: &[u8],
    ) -> Result<(), DispatchError> {
        self.sent.lock().expect("sent list").push((
            recipient.to_string(),
            file_name.to_string(),
            document.to_vec(),
        ));
        if self.fail {
            return Err(DispatchError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

/// A small solid-colour PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, b'P', b'N', b'G'])
}
