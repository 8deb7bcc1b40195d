//! Shared test utilities for app session integration tests
#![allow(dead_code)]

use common::config::Config;
use common::testkit::TestApp;

/// Set up a fresh app session over its own local native library
pub fn setup_test_app() -> TestApp {
    TestApp::new().unwrap()
}

/// Set up a session whose native library runs a single worker thread
pub fn setup_single_worker_app() -> TestApp {
    TestApp::with_config(Config {
        worker_threads: 1,
        ..Config::default()
    })
    .unwrap()
}

/// Set up a session whose native library has one worker and a tiny queue
pub fn setup_backpressured_app() -> TestApp {
    TestApp::with_config(Config {
        worker_threads: 1,
        max_queue_size: Some(4),
        ..Config::default()
    })
    .unwrap()
}

/// A message unique to `i`, used to spot cross-completion
pub fn message(i: usize) -> Vec<u8> {
    format!("message number {}", i).into_bytes()
}
