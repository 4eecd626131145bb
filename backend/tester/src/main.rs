use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde_json::json;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Status,
    Verification,
}

/// Fires one notification request at a running notifier.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    issue_id: String,

    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// User access token sent as the bearer credential
    #[arg(long)]
    token: String,

    #[arg(long, value_enum, default_value_t = Kind::Status)]
    kind: Kind,

    /// Omit for a verification change with no previous state
    #[arg(long)]
    old: Option<String>,

    #[arg(long)]
    new: String,

    #[arg(long)]
    verifier_name: Option<String>,

    #[arg(long)]
    verifier_role: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (path, body) = match args.kind {
        Kind::Status => (
            "notify-status-change",
            json!({
                "issue_id": args.issue_id,
                "old_status": args.old,
                "new_status": args.new,
            }),
        ),
        Kind::Verification => (
            "notify-verification-change",
            json!({
                "issue_id": args.issue_id,
                "old_status": args.old,
                "new_status": args.new,
                "verifier_name": args.verifier_name,
                "verifier_role": args.verifier_role,
            }),
        ),
    };

    let url = format!("{}/{path}", args.url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(&args.token)
        .json(&body)
        .send()
        .await?;

    println!("{} {}", response.status(), url);
    println!("{}", response.text().await?);

    Ok(())
}
