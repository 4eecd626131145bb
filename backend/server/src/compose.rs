//! Message composition.
//!
//! Two variants are rendered per dispatch, one addressed to the reporter and
//! one to followers. They differ only in wording and the follower banner, never
//! per recipient. Email bodies go through handlebars, whose `{{value}}`
//! interpolation HTML-escapes everything: issue text is untrusted user input.
use handlebars::{Handlebars, RenderError, TemplateError};
use serde_json::json;

use crate::{
    models::{DispatchKind, Issue, Recipient, Transition},
    utils::truncate,
};

const EMAIL_TEMPLATE: &str = "transition_email";

const STATUS_TITLE_CHARS: usize = 100;
const VERIFICATION_TITLE_CHARS: usize = 80;
const SUBJECT_TITLE_CHARS: usize = 50;
const DESCRIPTION_CHARS: usize = 150;

const EMAIL_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <style>
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; }
    .container { max-width: 600px; margin: 0 auto; padding: 20px; }
    .header { background: linear-gradient(135deg, {{accent}}, {{accent_light}}); color: white; padding: 30px; border-radius: 12px 12px 0 0; text-align: center; }
    .content { background: #f8fafc; padding: 30px; border-radius: 0 0 12px 12px; }
    .status-badge { display: inline-block; padding: 8px 16px; border-radius: 20px; font-weight: 600; margin: 10px 0; }
{{{badge_styles}}}
    .issue-card { background: white; border-radius: 8px; padding: 20px; margin: 20px 0; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
    .footer { text-align: center; color: #6b7280; font-size: 14px; margin-top: 20px; }
    .follower-note { background: {{banner_background}}; border-left: 4px solid {{accent}}; padding: 12px; margin: 15px 0; border-radius: 0 8px 8px 0; }
    .verifier-info { background: #ede9fe; padding: 10px 15px; border-radius: 6px; margin: 10px 0; font-size: 14px; }
  </style>
</head>
<body>
  <div class="container">
    <div class="header">
      <h1 style="margin: 0; font-size: 24px;">🏙️ City Sentinel</h1>
      <p style="margin: 10px 0 0; opacity: 0.9;">{{heading}}</p>
    </div>
    <div class="content">
      {{#if is_follower}}
      <div class="follower-note">
        <strong>📌 You're following this issue</strong>
        <p style="margin: 5px 0 0; font-size: 14px;">You're receiving this because you're following this issue.</p>
      </div>
      {{/if}}
      <h2 style="margin-top: 0;">{{headline}}</h2>
      <div class="issue-card">
        <h3 style="margin-top: 0;">{{title}}</h3>
        <p style="color: #6b7280; margin-bottom: 15px;">{{description}}</p>
        {{#if address}}
        <p style="font-size: 14px; color: #6b7280;">📍 {{address}}</p>
        {{/if}}
        <p><strong>{{state_caption}}</strong></p>
        <span class="status-badge status-{{state}}">{{label}}</span>
        {{#if show_actor}}
        <div class="verifier-info">
          <strong>Verified by:</strong> {{actor_name}}{{#if actor_role}} ({{actor_role}}){{/if}}
        </div>
        {{/if}}
      </div>
      <p>{{closing}}</p>
    </div>
    <div class="footer">
      <p>City Sentinel - Making our city better, together</p>
      <p style="font-size: 12px; color: #9ca3af;">You can manage your notification preferences in your profile settings.</p>
    </div>
  </div>
</body>
</html>
"#;

const STATUS_BADGES: &str = r#"    .status-pending { background: #fef3c7; color: #92400e; }
    .status-in_progress { background: #dbeafe; color: #1e40af; }
    .status-resolved { background: #d1fae5; color: #065f46; }
    .status-withdrawn { background: #f3f4f6; color: #374151; }"#;

const VERIFICATION_BADGES: &str = r#"    .status-pending_verification { background: #fef3c7; color: #92400e; }
    .status-verified { background: #d1fae5; color: #065f46; }
    .status-invalid { background: #fee2e2; color: #991b1b; }
    .status-spam { background: #f3f4f6; color: #374151; }"#;

struct KindStyle {
    reporter_title: &'static str,
    follower_title: &'static str,
    follower_subject: &'static str,
    heading: &'static str,
    reporter_headline: &'static str,
    follower_headline: &'static str,
    state_caption: &'static str,
    closing: &'static str,
    accent: &'static str,
    accent_light: &'static str,
    banner_background: &'static str,
    badge_styles: &'static str,
}

const STATUS_STYLE: KindStyle = KindStyle {
    reporter_title: "Issue Status Updated",
    follower_title: "Issue You Follow Updated",
    follower_subject: "Issue Update",
    heading: "Issue Status Update",
    reporter_headline: "Your issue has been updated!",
    follower_headline: "An issue you follow has been updated!",
    state_caption: "New Status:",
    closing: "Thank you for helping improve our city! We appreciate your patience and engagement.",
    accent: "#2563eb",
    accent_light: "#3b82f6",
    banner_background: "#eff6ff",
    badge_styles: STATUS_BADGES,
};

const VERIFICATION_STYLE: KindStyle = KindStyle {
    reporter_title: "Issue Verification Updated",
    follower_title: "Issue You Follow - Verification Update",
    follower_subject: "Verification Update",
    heading: "Issue Verification Update",
    reporter_headline: "Your issue verification status has changed!",
    follower_headline: "An issue you follow has been verified!",
    state_caption: "Verification Status:",
    closing: "Thank you for helping improve our city! We appreciate your engagement.",
    accent: "#7c3aed",
    accent_light: "#8b5cf6",
    banner_background: "#f3e8ff",
    badge_styles: VERIFICATION_BADGES,
};

impl KindStyle {
    fn of(kind: DispatchKind) -> &'static KindStyle {
        match kind {
            DispatchKind::Status => &STATUS_STYLE,
            DispatchKind::Verification => &VERIFICATION_STYLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub title: String,
    pub in_app_message: String,
    pub email_subject: String,
    pub email_html: String,
}

#[derive(Debug, Clone)]
pub struct ComposedPair {
    pub reporter: ComposedMessage,
    pub follower: ComposedMessage,
}

impl ComposedPair {
    pub fn for_recipient(&self, recipient: &Recipient) -> &ComposedMessage {
        if recipient.is_reporter {
            &self.reporter
        } else {
            &self.follower
        }
    }
}

pub struct Composer {
    registry: Handlebars<'static>,
}

impl Composer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template_string(EMAIL_TEMPLATE, EMAIL_HTML)?;

        Ok(Self { registry })
    }

    pub fn compose(&self, issue: &Issue, transition: &Transition) -> Result<ComposedPair, RenderError> {
        Ok(ComposedPair {
            reporter: self.compose_variant(issue, transition, false)?,
            follower: self.compose_variant(issue, transition, true)?,
        })
    }

    fn compose_variant(
        &self,
        issue: &Issue,
        transition: &Transition,
        is_follower: bool,
    ) -> Result<ComposedMessage, RenderError> {
        let style = KindStyle::of(transition.kind);
        let label = transition.new_state.label();

        let title = if is_follower {
            format!("{}: {label}", style.follower_title)
        } else {
            format!("{}: {label}", style.reporter_title)
        };

        let email_subject = if is_follower {
            format!(
                "{}: {}",
                style.follower_subject,
                truncate(&issue.title, SUBJECT_TITLE_CHARS)
            )
        } else {
            title.clone()
        };

        let description = if issue.description.chars().count() > DESCRIPTION_CHARS {
            format!("{}...", truncate(&issue.description, DESCRIPTION_CHARS))
        } else {
            issue.description.clone()
        };

        let show_actor = transition.kind == DispatchKind::Verification
            && (transition.actor_name.is_some() || transition.actor_role.is_some());

        let email_html = self.registry.render(
            EMAIL_TEMPLATE,
            &json!({
                "heading": style.heading,
                "headline": if is_follower { style.follower_headline } else { style.reporter_headline },
                "state_caption": style.state_caption,
                "closing": style.closing,
                "accent": style.accent,
                "accent_light": style.accent_light,
                "banner_background": style.banner_background,
                "badge_styles": style.badge_styles,
                "is_follower": is_follower,
                "title": issue.title,
                "description": description,
                "address": issue.address.as_deref().filter(|address| !address.is_empty()),
                "state": transition.new_state.as_str(),
                "label": label,
                "show_actor": show_actor,
                "actor_name": transition.actor_name.as_deref().unwrap_or("Unknown"),
                "actor_role": transition.actor_role,
            }),
        )?;

        Ok(ComposedMessage {
            title,
            in_app_message: in_app_message(issue, transition, is_follower),
            email_subject,
            email_html,
        })
    }
}

fn in_app_message(issue: &Issue, transition: &Transition, is_follower: bool) -> String {
    let new = transition.new_state.label();
    let old = transition.old_label();

    match (transition.kind, is_follower) {
        (DispatchKind::Status, false) => format!(
            "Your issue \"{}\" has been updated from {old} to {new}.",
            truncate(&issue.title, STATUS_TITLE_CHARS)
        ),
        (DispatchKind::Status, true) => format!(
            "Issue \"{}\" has been updated from {old} to {new}.",
            truncate(&issue.title, STATUS_TITLE_CHARS)
        ),
        (DispatchKind::Verification, false) => {
            let by = transition
                .actor_role
                .as_deref()
                .map(|role| format!(" by a {role}"))
                .unwrap_or_default();

            format!(
                "Your issue \"{}\" has been {}{by}.",
                truncate(&issue.title, VERIFICATION_TITLE_CHARS),
                new.to_lowercase()
            )
        }
        (DispatchKind::Verification, true) => format!(
            "Issue \"{}\" verification status changed from {old} to {new}.",
            truncate(&issue.title, VERIFICATION_TITLE_CHARS)
        ),
    }
}
