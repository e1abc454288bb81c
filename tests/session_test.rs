#![cfg(feature = "web")]

mod common;

use common::TestEnv;
use report_dashboard::app::{SESSION_DURATION, Session, SessionRegistry};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

fn session(env: &TestEnv) -> Session {
    Arc::new(Mutex::new(env.workflow()))
}

#[test]
fn sessions_expire_after_their_duration() {
    let env = TestEnv::new();
    let registry = SessionRegistry::new(SESSION_DURATION);
    let now = SystemTime::now();

    let id = registry.insert_at(session(&env), now).expect("insert");
    assert!(registry.get_at(&id, now + Duration::from_secs(60)).is_some());
    assert!(registry.get_at(&id, now + SESSION_DURATION).is_none());
    assert!(registry.get_at("unknown", now).is_none());
    println!("✓ session lookup honours expiry");
}

#[test]
fn inserting_prunes_expired_sessions() {
    let env = TestEnv::new();
    let registry = SessionRegistry::new(Duration::from_secs(60));
    let start = SystemTime::now();

    registry.insert_at(session(&env), start).expect("insert");
    registry.insert_at(session(&env), start).expect("insert");
    assert_eq!(registry.len(), 2);

    let later = start + Duration::from_secs(120);
    let fresh = registry.insert_at(session(&env), later).expect("insert");
    assert_eq!(registry.len(), 1);
    assert!(registry.get_at(&fresh, later).is_some());
    println!("✓ expired sessions dropped on login");
}

#[test]
fn prune_and_remove() {
    let env = TestEnv::new();
    let registry = SessionRegistry::new(Duration::from_secs(60));
    let start = SystemTime::now();

    let first = registry.insert_at(session(&env), start).expect("insert");
    let second = registry
        .insert_at(session(&env), start + Duration::from_secs(50))
        .expect("insert");
    assert_ne!(first, second);

    assert_eq!(registry.prune(start + Duration::from_secs(90)), 1);
    assert!(registry.remove(&first).is_none());
    assert!(registry.remove(&second).is_some());
    assert!(registry.is_empty());
    println!("✓ prune and remove");
}
