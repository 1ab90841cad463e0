#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tenantauth::auth::AuthClient;
use tenantauth::authority::HttpAuthority;
use tenantauth::config::{config_from_yaml, AuthorityConfig, ConfigV1};
use tenantauth::guard::Guard;
use tenantauth::notify::{Notice, Notifier};
use tenantauth::session::SessionState;
use tenantauth::store::memory_store::MemoryStore;
use tenantauth::store::CredentialStore;

/// Keeps notices so tests can assert on what the user would have seen.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn taken(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub struct TestApp {
    pub client: AuthClient,
    pub guard: Guard,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub async fn stored(&self) -> Option<String> {
        self.store
            .load()
            .await
            .expect("memory store never fails")
            .map(|c| c.as_str().to_string())
    }
}

/// An app talking to the mock authority at `uri`, with an in-memory store.
pub fn build_test_app(uri: &str, store: MemoryStore) -> TestApp {
    let authority = HttpAuthority::new(&AuthorityConfig {
        base_url: uri.to_string(),
        timeout_in_ms: 3000,
    })
    .expect("authority client should build");
    let store = Arc::new(store);
    let notifier = Arc::new(RecordingNotifier::default());
    let client = AuthClient::new(
        Arc::new(authority),
        store.clone(),
        SessionState::new(),
        notifier.clone(),
    );
    TestApp {
        guard: Guard::new(client.clone()),
        client,
        store,
        notifier,
    }
}

pub fn config_with_file_store(uri: &str, path: &std::path::Path) -> ConfigV1 {
    let yaml = format!(
        r#"
version: "1.0.0"
authority:
  base_url: "{}"
  timeout_in_ms: 3000
store:
  enabled: true
  type: file
  path: "{}"
logging:
  level: debug
  format: json
"#,
        uri,
        path.display()
    );
    config_from_yaml(&yaml).expect("test config should parse")
}

pub fn admin_user() -> Value {
    json!({"id": 1, "username": "root", "email": "root@example.com", "role": "admin", "reseller_id": null})
}

pub fn reseller_user(tenant: &str) -> Value {
    json!({"id": tenant, "username": tenant, "role": "reseller", "company_name": "Acme", "reseller_id": tenant})
}

pub fn end_user(id: u64, tenant: &str) -> Value {
    json!({"id": id, "username": format!("user{}", id), "role": "user", "reseller_id": tenant})
}

pub fn token_body(token: &str, user: Value) -> String {
    json!({"access_token": token, "token_type": "bearer", "user": user}).to_string()
}

pub fn impersonation_body(token: &str, user: Value, admin_id: u64) -> String {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "user": user,
        "impersonation": true,
        "original_admin_id": admin_id
    })
    .to_string()
}
