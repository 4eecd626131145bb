use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ADMIN_ROLES: &[&str] = &[
    "admin",
    "super_admin",
    "moderator",
    "department_admin",
    "field_worker",
];

pub const VERIFIER_ROLES: &[&str] = &[
    "admin",
    "super_admin",
    "moderator",
    "department_admin",
    "field_worker",
];

const STATUS_FIELDS: &[&str] = &["issue_id", "old_status", "new_status"];
const VERIFICATION_FIELDS: &[&str] = &[
    "issue_id",
    "old_status",
    "new_status",
    "verifier_name",
    "verifier_role",
];

/// Snapshot of an issue row as read at dispatch time.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub address: Option<String>,
    pub reporter_id: Option<String>,
    pub reporter_email: Option<String>,
    pub status: Option<String>,
    pub verification_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Status,
    Verification,
}

impl DispatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchKind::Status => "status",
            DispatchKind::Verification => "verification",
        }
    }

    /// Only a first verification has no prior state; issue status always starts at `pending`.
    pub fn allows_null_old_state(self) -> bool {
        matches!(self, DispatchKind::Verification)
    }

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            DispatchKind::Status => STATUS_FIELDS,
            DispatchKind::Verification => VERIFICATION_FIELDS,
        }
    }

    pub fn states(self) -> &'static [&'static str] {
        match self {
            DispatchKind::Status => StatusState::ALL,
            DispatchKind::Verification => VerificationState::ALL,
        }
    }

    pub fn parse_state(self, raw: &str) -> Option<TransitionState> {
        match self {
            DispatchKind::Status => StatusState::parse(raw).map(TransitionState::Status),
            DispatchKind::Verification => {
                VerificationState::parse(raw).map(TransitionState::Verification)
            }
        }
    }

    /// Status notifications may come from the reporter or staff. Verification
    /// notifications only from verifier roles, never the reporter on their own behalf.
    pub fn permits(self, caller_id: &str, issue: &Issue, roles: &[String]) -> bool {
        let holds = |allowed: &[&str]| roles.iter().any(|role| allowed.contains(&role.as_str()));

        match self {
            DispatchKind::Status => {
                issue.reporter_id.as_deref() == Some(caller_id) || holds(ADMIN_ROLES)
            }
            DispatchKind::Verification => holds(VERIFIER_ROLES),
        }
    }

    pub fn forbidden_message(self) -> &'static str {
        match self {
            DispatchKind::Status => "Forbidden: insufficient permissions to trigger notifications",
            DispatchKind::Verification => {
                "Forbidden: only moderators and admins can trigger verification notifications"
            }
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            DispatchKind::Status => "Notifications sent",
            DispatchKind::Verification => "Verification notifications sent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Pending,
    InProgress,
    Resolved,
    Withdrawn,
}

impl StatusState {
    pub const ALL: &'static [&'static str] = &["pending", "in_progress", "resolved", "withdrawn"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(StatusState::Pending),
            "in_progress" => Some(StatusState::InProgress),
            "resolved" => Some(StatusState::Resolved),
            "withdrawn" => Some(StatusState::Withdrawn),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::InProgress => "in_progress",
            StatusState::Resolved => "resolved",
            StatusState::Withdrawn => "withdrawn",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusState::Pending => "Pending",
            StatusState::InProgress => "In Progress",
            StatusState::Resolved => "Resolved",
            StatusState::Withdrawn => "Withdrawn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    PendingVerification,
    Verified,
    Invalid,
    Spam,
}

impl VerificationState {
    pub const ALL: &'static [&'static str] = &["pending_verification", "verified", "invalid", "spam"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending_verification" => Some(VerificationState::PendingVerification),
            "verified" => Some(VerificationState::Verified),
            "invalid" => Some(VerificationState::Invalid),
            "spam" => Some(VerificationState::Spam),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationState::PendingVerification => "pending_verification",
            VerificationState::Verified => "verified",
            VerificationState::Invalid => "invalid",
            VerificationState::Spam => "spam",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VerificationState::PendingVerification => "Pending Verification",
            VerificationState::Verified => "Verified",
            VerificationState::Invalid => "Invalid",
            VerificationState::Spam => "Spam",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Status(StatusState),
    Verification(VerificationState),
}

impl TransitionState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionState::Status(state) => state.as_str(),
            TransitionState::Verification(state) => state.as_str(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransitionState::Status(state) => state.label(),
            TransitionState::Verification(state) => state.label(),
        }
    }
}

/// A validated state change. Describes a transition the caller already committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub kind: DispatchKind,
    pub issue_id: String,
    pub old_state: Option<TransitionState>,
    pub new_state: TransitionState,
    pub actor_name: Option<String>,
    pub actor_role: Option<String>,
}

impl Transition {
    /// Inbox grouping tag, e.g. `status_resolved` or `verification_spam`.
    pub fn type_tag(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.new_state.as_str())
    }

    pub fn old_label(&self) -> &'static str {
        self.old_state.map_or("None", TransitionState::label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub email: Option<String>,
    pub wants_email: bool,
    pub is_reporter: bool,
}

impl Recipient {
    pub fn email_target(&self) -> Option<&str> {
        self.email.as_deref().filter(|_| self.wants_email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub issue_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchResult {
    pub success: bool,
    pub message: String,
    pub notifications_created: usize,
    pub emails_sent: usize,
}
