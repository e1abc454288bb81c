use report_dashboard::config::AppConfig;
use report_dashboard::mailer::TransportSecurity;
use std::fs;

#[test]
fn missing_file_gives_defaults() {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let config = AppConfig::load(tmp.path().join("absent.json")).expect("load");

    assert_eq!(config.bind_address, "127.0.0.1:3000");
    assert_eq!(config.report_title, "Auto-Generated Report");
    assert_eq!(config.preview_rows, 50);
    assert!(config.users.is_empty());
    assert!(config.smtp.is_none());

    let chart = config.chart_options();
    assert_eq!((chart.width, chart.height), (640, 480));
    println!("✓ defaults");
}

#[test]
fn partial_file_fills_in_defaults() {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let path = tmp.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "report_title": "Sales",
            "chart_width": 800,
            "users": [{"username": "admin", "password_hash": "h", "role": "admin"}]
        }"#,
    )
    .expect("write");

    let config = AppConfig::load(&path).expect("load");
    assert_eq!(config.report_title, "Sales");
    assert_eq!(config.chart_options().width, 800);
    assert_eq!(config.chart_options().height, 480);
    assert_eq!(config.credentials().len(), 1);
    println!("✓ partial config");
}

#[test]
fn smtp_settings_and_env_overrides() {
    let mut config: AppConfig = serde_json::from_str(
        r#"{
            "smtp": {
                "host": "smtp.example.com",
                "security": "starttls",
                "username": "file-user",
                "from": "Reports <reports@example.com>"
            }
        }"#,
    )
    .expect("parse");

    let smtp = config.smtp.as_ref().expect("smtp");
    assert_eq!(smtp.port, 465);
    assert_eq!(smtp.security, TransportSecurity::Starttls);
    assert_eq!(smtp.password, "");

    config.apply_env(Some("env-user".to_string()), Some("env-pass".to_string()));
    let smtp = config.smtp.as_ref().expect("smtp");
    assert_eq!(smtp.username, "env-user");
    assert_eq!(smtp.password, "env-pass");

    config.apply_env(None, Some("second".to_string()));
    let smtp = config.smtp.as_ref().expect("smtp");
    assert_eq!(smtp.username, "env-user");
    assert_eq!(smtp.password, "second");
    println!("✓ SMTP settings");
}

#[test]
fn env_overrides_without_smtp_are_ignored() {
    let mut config = AppConfig::default();
    config.apply_env(Some("u".to_string()), Some("p".to_string()));
    assert!(config.smtp.is_none());
    println!("✓ no SMTP section, nothing to override");
}

#[test]
fn malformed_file_is_an_error() {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let path = tmp.path().join("config.json");
    fs::write(&path, "{ not json").expect("write");

    assert!(AppConfig::load(&path).is_err());
    println!("✓ malformed config rejected");
}
