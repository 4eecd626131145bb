use std::collections::{HashMap, HashSet};

use crate::models::{Issue, Recipient};

/// Everything the resolver needs, gathered up front by the dispatcher.
#[derive(Debug, Default, Clone)]
pub struct Audience {
    pub followers: Vec<String>,
    /// Explicit `notification_email` flags. Missing means opted in.
    pub email_preferences: HashMap<String, bool>,
    /// Best-effort directory addresses. Missing means no email channel for that user.
    pub directory_emails: HashMap<String, String>,
}

/// Reporter first, then followers in source order, each user at most once.
/// An address already claimed by an earlier emailed recipient is not reused.
pub fn resolve(issue: &Issue, audience: &Audience) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    let mut claimed = HashSet::new();
    let mut recipients = Vec::new();

    let mut push = |user_id: &str, email: Option<String>, is_reporter: bool| {
        if !seen.insert(user_id.to_string()) {
            return;
        }

        let wants_email = audience
            .email_preferences
            .get(user_id)
            .copied()
            .unwrap_or(true);
        let email =
            email.filter(|address| !wants_email || claimed.insert(address.to_lowercase()));

        recipients.push(Recipient {
            user_id: user_id.to_string(),
            email,
            wants_email,
            is_reporter,
        });
    };

    if let Some(reporter_id) = reporter_of(issue) {
        let email = issue
            .reporter_email
            .clone()
            .filter(|address| !address.is_empty())
            .or_else(|| audience.directory_emails.get(reporter_id).cloned());

        push(reporter_id, email, true);
    }

    for follower in &audience.followers {
        push(
            follower.as_str(),
            audience.directory_emails.get(follower).cloned(),
            false,
        );
    }

    recipients
}

pub fn reporter_of(issue: &Issue) -> Option<&str> {
    issue.reporter_id.as_deref().filter(|id| !id.is_empty())
}
