#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use notifier::{
    auth::{Caller, IdentityVerifier},
    channels::{ChannelError, DisabledMailer, Inbox, Mailer, NotificationDraft, SendOutcome},
    database::{AudienceDirectory, IssueDirectory, StoreError},
    dispatch::{Backends, Dispatcher},
    error::{AppError, INVALID_CREDENTIAL},
    models::{Issue, NotificationRecord},
};

pub const ISSUE_ID: &str = "0b6f1d9e-8a47-4d0f-a0f4-2c9b7a51e3d2";
pub const REPORTER: &str = "reporter";
pub const REPORTER_TOKEN: &str = "token-reporter";
pub const MODERATOR: &str = "moderator-user";
pub const MODERATOR_TOKEN: &str = "token-moderator";
pub const STRANGER: &str = "stranger";
pub const STRANGER_TOKEN: &str = "token-stranger";

pub fn issue(title: &str) -> Issue {
    Issue {
        id: ISSUE_ID.to_string(),
        title: title.to_string(),
        description: "Large pothole in the bike lane".to_string(),
        address: Some("5 Harbor Rd".to_string()),
        reporter_id: Some(REPORTER.to_string()),
        reporter_email: Some("reporter@city.test".to_string()),
        status: Some("resolved".to_string()),
        verification_status: None,
    }
}

pub fn status_body(old: &str, new: &str) -> String {
    format!(r#"{{"issue_id":"{ISSUE_ID}","old_status":"{old}","new_status":"{new}"}}"#)
}

pub fn verification_body(new: &str) -> String {
    format!(
        r#"{{"issue_id":"{ISSUE_ID}","old_status":null,"new_status":"{new}","verifier_name":"Dana","verifier_role":"moderator"}}"#
    )
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub struct FakeIdentity {
    tokens: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::from([
                (REPORTER_TOKEN.to_string(), REPORTER.to_string()),
                (MODERATOR_TOKEN.to_string(), MODERATOR.to_string()),
                (STRANGER_TOKEN.to_string(), STRANGER.to_string()),
            ]),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IdentityVerifier for FakeIdentity {
    async fn verify(&self, token: &str) -> Result<Caller, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.tokens
            .get(token)
            .map(|user_id| Caller {
                user_id: user_id.clone(),
            })
            .ok_or(AppError::Unauthenticated(INVALID_CREDENTIAL))
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub issues: HashMap<String, Issue>,
    pub roles: HashMap<String, Vec<String>>,
    pub followers: Vec<String>,
    pub preferences: HashMap<String, bool>,
    pub emails: HashMap<String, String>,
    pub failing_inbox: HashSet<String>,
    pub failing_followers: bool,
    pub unavailable: bool,
    pub reads: AtomicUsize,
    pub records: Mutex<Vec<NotificationRecord>>,
}

impl FakeStore {
    pub fn with_issue(issue: Issue) -> Self {
        Self {
            issues: HashMap::from([(issue.id.clone(), issue)]),
            roles: HashMap::from([(MODERATOR.to_string(), vec!["moderator".to_string()])]),
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_for(&self, user_id: &str) -> usize {
        self.records()
            .iter()
            .filter(|record| record.user_id == user_id)
            .count()
    }

    fn read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.unavailable {
            return Err(StoreError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "connection refused".to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl IssueDirectory for FakeStore {
    async fn load_issue(&self, issue_id: &str) -> Result<Option<Issue>, StoreError> {
        self.read()?;
        Ok(self.issues.get(issue_id).cloned())
    }

    async fn roles_for(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.read()?;
        Ok(self.roles.get(user_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AudienceDirectory for FakeStore {
    async fn followers_of(&self, _issue_id: &str) -> Result<Vec<String>, StoreError> {
        self.read()?;

        if self.failing_followers {
            return Err(StoreError::Status {
                status: StatusCode::BAD_REQUEST,
                body: "relation \"issue_followers\" does not exist".to_string(),
            });
        }

        Ok(self.followers.clone())
    }

    async fn email_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, bool>, StoreError> {
        self.read()?;
        Ok(self
            .preferences
            .iter()
            .filter(|(user_id, _)| user_ids.contains(*user_id))
            .map(|(user_id, wants)| (user_id.clone(), *wants))
            .collect())
    }

    async fn email_for(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        self.read()?;
        Ok(self.emails.get(user_id).cloned())
    }
}

#[async_trait]
impl Inbox for FakeStore {
    async fn persist(
        &self,
        draft: NotificationDraft<'_>,
    ) -> Result<NotificationRecord, ChannelError> {
        if self.failing_inbox.contains(draft.user_id) {
            return Err(ChannelError::Store(StoreError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "insert failed".to_string(),
            }));
        }

        let mut records = self.records.lock().unwrap();
        let record = NotificationRecord {
            id: format!("notification-{}", records.len()),
            user_id: draft.user_id.to_string(),
            issue_id: draft.issue_id.to_string(),
            title: draft.title.to_string(),
            message: draft.message.to_string(),
            kind: draft.kind.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        records.push(record.clone());

        Ok(record)
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Default)]
pub struct FakeMailer {
    pub failing: HashSet<String>,
    pub delay: Option<Duration>,
    pub sent: Mutex<Vec<SentEmail>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<SendOutcome, ChannelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(to) {
            return Err(ChannelError::Provider {
                status: StatusCode::BAD_GATEWAY,
                body: "provider down".to_string(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });

        Ok(SendOutcome::Sent {
            id: Some(format!("email-{}", sent.len())),
        })
    }
}

pub struct Harness {
    pub identity: Arc<FakeIdentity>,
    pub store: Arc<FakeStore>,
    pub mailer: Option<Arc<FakeMailer>>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new(store: FakeStore, mailer: Option<FakeMailer>) -> Self {
        Self::with_timeout(store, mailer, Duration::from_secs(5))
    }

    pub fn with_timeout(store: FakeStore, mailer: Option<FakeMailer>, timeout: Duration) -> Self {
        let identity = Arc::new(FakeIdentity::new());
        let store = Arc::new(store);
        let mailer = mailer.map(Arc::new);

        let backends = Backends {
            identity: identity.clone(),
            issues: store.clone(),
            audience: store.clone(),
            inbox: store.clone(),
            mailer: match &mailer {
                Some(mailer) => mailer.clone() as Arc<dyn Mailer>,
                None => Arc::new(DisabledMailer),
            },
        };

        Self {
            identity,
            store,
            mailer,
            dispatcher: Dispatcher::new(backends, timeout).expect("templates"),
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.mailer
            .as_ref()
            .map(|mailer| mailer.sent())
            .unwrap_or_default()
    }
}
