use report_dashboard::error::DispatchError;
use report_dashboard::mailer::{MailSettings, Mailer, TransportSecurity};

fn settings() -> MailSettings {
    MailSettings {
        host: "localhost".to_string(),
        port: 2525,
        security: TransportSecurity::Starttls,
        username: "reports@example.com".to_string(),
        password: "secret".to_string(),
        from: "Reports <reports@example.com>".to_string(),
    }
}

#[test]
fn message_carries_the_pdf_attachment() {
    let mailer = Mailer::new(&settings()).expect("mailer");
    let message = mailer
        .build_message("bob@example.com", "user_report_20240101120000.pdf", b"%PDF-1.3 test")
        .expect("message");

    let raw = String::from_utf8_lossy(&message.formatted()).to_string();
    assert!(raw.contains("Subject: Automated Report"));
    assert!(raw.contains("To: bob@example.com"));
    assert!(raw.contains("Please find the attached report."));
    assert!(raw.contains("application/pdf"));
    assert!(raw.contains("user_report_20240101120000.pdf"));
    println!("✓ message with attachment");
}

#[test]
fn bad_recipient_is_rejected() {
    let mailer = Mailer::new(&settings()).expect("mailer");
    let err = mailer
        .build_message("not an address", "r.pdf", b"%PDF")
        .unwrap_err();
    assert!(matches!(err, DispatchError::Address(a) if a == "not an address"));
    println!("✓ bad recipient");
}

#[test]
fn bad_sender_is_rejected() {
    let mut settings = settings();
    settings.from = "nobody".to_string();
    assert!(matches!(
        Mailer::new(&settings),
        Err(DispatchError::Address(_))
    ));
    println!("✓ bad sender");
}
