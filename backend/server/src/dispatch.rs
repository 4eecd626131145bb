//! # Dispatch
//!
//! One invocation notifies everyone affected by one transition, exactly once.
//!
//! ## Pipeline
//!
//! 1. Authenticate the bearer credential (no store access before this)
//! 2. Parse and validate the payload
//! 3. Load the issue snapshot
//! 4. Authorize, producing a [`DispatchGrant`]
//! 5. Resolve recipients, compose, fan out to the inbox and mailer
//!
//! Steps 1 to 4 can fail the request. Once a grant exists the dispatch always
//! succeeds, with whatever counts the channels managed.
//!
//! ## Capabilities
//!
//! Only the pre-authorization reads take the caller's word for anything. The
//! audience reads and the two channels are reachable only through
//! [`Dispatcher::deliver`], which takes a grant by value.
use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::join_all;
use handlebars::TemplateError;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
    auth::{Caller, IdentityVerifier, bearer_token},
    channels::{Inbox, Mailer, NotificationDraft, SendOutcome},
    compose::{ComposedMessage, Composer},
    database::{AudienceDirectory, IssueDirectory},
    error::AppError,
    models::{DispatchKind, DispatchResult, Issue, Recipient, Transition},
    recipients::{Audience, reporter_of, resolve},
    utils::get_transition_from_body,
};

pub const DEFAULT_EMAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators the dispatcher is built from.
pub struct Backends {
    pub identity: Arc<dyn IdentityVerifier>,
    pub issues: Arc<dyn IssueDirectory>,
    pub audience: Arc<dyn AudienceDirectory>,
    pub inbox: Arc<dyn Inbox>,
    pub mailer: Arc<dyn Mailer>,
}

/// Proof that a caller may notify about one issue. Only [`Dispatcher`] mints these.
pub struct DispatchGrant {
    caller: Caller,
    issue: Issue,
}

impl DispatchGrant {
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn issue(&self) -> &Issue {
        &self.issue
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Delivery {
    in_app: bool,
    email: bool,
}

pub struct Dispatcher {
    backends: Backends,
    composer: Composer,
    email_timeout: Duration,
}

impl Dispatcher {
    pub fn new(backends: Backends, email_timeout: Duration) -> Result<Self, TemplateError> {
        Ok(Self {
            backends,
            composer: Composer::new()?,
            email_timeout,
        })
    }

    pub fn email_enabled(&self) -> bool {
        self.backends.mailer.enabled()
    }

    pub async fn dispatch(
        &self,
        kind: DispatchKind,
        body: &[u8],
        credential: Option<&str>,
    ) -> Result<DispatchResult, AppError> {
        let token = bearer_token(credential)?;
        let caller = self.backends.identity.verify(token).await?;
        debug!("Authenticated user {}", caller.user_id);

        let transition = get_transition_from_body(kind, body)?;
        info!(
            "Processing {} change for issue {}: {} -> {}",
            kind.as_str(),
            transition.issue_id,
            transition.old_state.map_or("null", |state| state.as_str()),
            transition.new_state.as_str()
        );

        let issue = self
            .backends
            .issues
            .load_issue(&transition.issue_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let grant = self.authorize(caller, issue, kind).await?;

        self.deliver(grant, &transition).await
    }

    async fn authorize(
        &self,
        caller: Caller,
        issue: Issue,
        kind: DispatchKind,
    ) -> Result<DispatchGrant, AppError> {
        let roles = self.backends.issues.roles_for(&caller.user_id).await?;

        if !kind.permits(&caller.user_id, &issue, &roles) {
            warn!(
                "User {} lacks permission for {} notifications on issue {}",
                caller.user_id,
                kind.as_str(),
                issue.id
            );
            return Err(AppError::Unauthorized(kind.forbidden_message()));
        }

        Ok(DispatchGrant { caller, issue })
    }

    /// Everything past authorization. Channel failures are logged and counted, never returned.
    pub async fn deliver(
        &self,
        grant: DispatchGrant,
        transition: &Transition,
    ) -> Result<DispatchResult, AppError> {
        let issue = grant.issue();

        let composed = self
            .composer
            .compose(issue, transition)
            .map_err(|e| AppError::InternalError(Box::new(e)))?;

        let audience = self.gather_audience(issue).await;
        let recipients = resolve(issue, &audience);
        let type_tag = transition.type_tag();

        debug!(
            "Dispatching to {} recipients on behalf of {}",
            recipients.len(),
            grant.caller().user_id
        );

        let deliveries = join_all(recipients.iter().map(|recipient| {
            self.notify(
                issue,
                recipient,
                composed.for_recipient(recipient),
                &type_tag,
            )
        }))
        .await;

        let notifications_created = deliveries.iter().filter(|d| d.in_app).count();
        let emails_sent = deliveries.iter().filter(|d| d.email).count();

        info!("Notifications created: {notifications_created}, Emails sent: {emails_sent}");

        Ok(DispatchResult {
            success: true,
            message: transition.kind.success_message().to_string(),
            notifications_created,
            emails_sent,
        })
    }

    /// Best-effort lookups. A failed read narrows the audience, it never fails the dispatch.
    async fn gather_audience(&self, issue: &Issue) -> Audience {
        let directory = &self.backends.audience;

        let followers = directory.followers_of(&issue.id).await.unwrap_or_else(|e| {
            error!("Error fetching followers for issue {}: {e}", issue.id);
            Vec::new()
        });

        let mut user_ids: Vec<String> = reporter_of(issue).map(str::to_string).into_iter().collect();
        for follower in &followers {
            if !user_ids.contains(follower) {
                user_ids.push(follower.clone());
            }
        }

        let email_preferences = directory
            .email_preferences(&user_ids)
            .await
            .unwrap_or_else(|e| {
                warn!("Error fetching email preferences for issue {}: {e}", issue.id);
                HashMap::new()
            });

        let mut audience = Audience {
            followers,
            email_preferences,
            directory_emails: HashMap::new(),
        };

        if !self.email_enabled() {
            return audience;
        }

        let has_reporter_email = issue
            .reporter_email
            .as_deref()
            .is_some_and(|email| !email.is_empty());

        let lookups = user_ids
            .into_iter()
            .filter(|id| audience.email_preferences.get(id).copied().unwrap_or(true))
            .filter(|id| !(has_reporter_email && reporter_of(issue) == Some(id.as_str())))
            .map(|id| async move {
                let email = directory.email_for(&id).await;
                (id, email)
            });

        for (user_id, email) in join_all(lookups).await {
            match email {
                Ok(Some(email)) => {
                    audience.directory_emails.insert(user_id, email);
                }
                Ok(None) => debug!("No email address for user {user_id}"),
                Err(e) => warn!("Error fetching email for user {user_id}: {e}"),
            }
        }

        audience
    }

    async fn notify(
        &self,
        issue: &Issue,
        recipient: &Recipient,
        message: &ComposedMessage,
        type_tag: &str,
    ) -> Delivery {
        let draft = NotificationDraft {
            user_id: &recipient.user_id,
            issue_id: &issue.id,
            title: &message.title,
            message: &message.in_app_message,
            kind: type_tag,
        };

        let (in_app, email) = tokio::join!(
            self.backends.inbox.persist(draft),
            self.email(issue, recipient, message)
        );

        let in_app = match in_app {
            Ok(record) => {
                debug!("Notification {} created for user {}", record.id, recipient.user_id);
                true
            }
            Err(e) => {
                error!(
                    "Error creating notification for user {} on issue {}: {e}",
                    recipient.user_id, issue.id
                );
                false
            }
        };

        Delivery { in_app, email }
    }

    async fn email(&self, issue: &Issue, recipient: &Recipient, message: &ComposedMessage) -> bool {
        let Some(address) = recipient.email_target() else {
            return false;
        };

        let send = self
            .backends
            .mailer
            .send(address, &message.email_subject, &message.email_html);

        match timeout(self.email_timeout, send).await {
            Ok(Ok(SendOutcome::Sent { id })) => {
                debug!("Email {id:?} sent to user {}", recipient.user_id);
                true
            }
            Ok(Ok(SendOutcome::Skipped)) => false,
            Ok(Err(e)) => {
                error!(
                    "Error sending email to user {} on issue {}: {e}",
                    recipient.user_id, issue.id
                );
                false
            }
            Err(_) => {
                error!(
                    "Email to user {} on issue {} timed out after {:?}",
                    recipient.user_id, issue.id, self.email_timeout
                );
                false
            }
        }
    }
}
