//! Command-line arguments and command execution.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};

use voxchat_core::models::{UpdateConversationRequest, UpdateUserProfileRequest};
use voxchat_core::transcript::{TranscriptBridge, TranscriptSegment};
use voxchat_core::{ApiClient, Config};

#[derive(Parser)]
#[command(name = "voxchat")]
#[command(about = "Command-line client for the voxchat voice assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in (password is prompted)
    Login { email: String },
    /// Create an account
    Register {
        email: String,
        first_name: String,
        last_name: String,
    },
    /// Log out and forget tokens
    Logout,
    /// Show the current session
    Status,
    /// Renew the access token now
    Refresh,
    /// Show your profile, or change your name
    Profile(ProfileArgs),
    /// List conversations
    Conversations,
    /// Start a conversation
    New {
        #[arg(required = true)]
        title: Vec<String>,
    },
    /// Rename a conversation
    Rename {
        conversation_id: String,
        #[arg(required = true)]
        title: Vec<String>,
    },
    /// Archive a conversation
    Archive { conversation_id: String },
    /// Show a conversation
    Messages { conversation_id: String },
    /// Send a message
    Say {
        conversation_id: String,
        #[arg(required = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Open a voice session
    Voice { conversation_id: String },
    /// End a voice session
    Hangup { session_id: String },
    /// Post final transcript segments (JSON lines)
    Transcript {
        conversation_id: String,
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ProfileArgs {
    #[arg(requires = "last_name")]
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn run(api: &ApiClient, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(api, &email).await,
        Command::Register {
            email,
            first_name,
            last_name,
        } => register(api, &email, &first_name, &last_name).await,
        Command::Logout => {
            let message = api.logout().await?;
            println!("{}", message.as_deref().unwrap_or("Logged out."));
            Ok(())
        }
        Command::Status => {
            status(api, config);
            Ok(())
        }
        Command::Refresh => refresh(api).await,
        Command::Profile(ProfileArgs {
            first_name: Some(first_name),
            last_name: Some(last_name),
        }) => {
            let update = UpdateUserProfileRequest {
                first_name: Some(first_name),
                last_name: Some(last_name),
                ..Default::default()
            };
            let profile = api.update_profile(&update).await?;
            println!("Name changed to {}.", profile.display_name());
            Ok(())
        }
        Command::Profile(_) => {
            let profile = api.fetch_profile().await?;
            println!("{} ({})", profile.display_name(), profile.id);
            if let Some(dob) = &profile.date_of_birth {
                println!("Born {}", dob);
            }
            Ok(())
        }
        Command::Conversations => conversations(api).await,
        Command::New { title } => {
            let conversation = api.create_conversation(&title.join(" ")).await?;
            println!("{}  {}", conversation.id, conversation.display_title());
            Ok(())
        }
        Command::Rename {
            conversation_id,
            title,
        } => {
            let update = UpdateConversationRequest {
                title: Some(title.join(" ")),
                ..Default::default()
            };
            let conversation = api.update_conversation(&conversation_id, &update).await?;
            println!("{}  {}", conversation.id, conversation.display_title());
            Ok(())
        }
        Command::Archive { conversation_id } => {
            let update = UpdateConversationRequest {
                is_archived: Some(true),
                ..Default::default()
            };
            api.update_conversation(&conversation_id, &update).await?;
            println!("Archived {}.", conversation_id);
            Ok(())
        }
        Command::Messages { conversation_id } => messages(api, &conversation_id).await,
        Command::Say {
            conversation_id,
            text,
        } => {
            let message = api.send_text(&conversation_id, &text.join(" ")).await?;
            println!("Sent message {}", message.id);
            Ok(())
        }
        Command::Voice { conversation_id } => {
            let voice = api.create_voice_session(&conversation_id).await?;
            println!("Voice session {} ({})", voice.id, voice.status);
            println!("Room token: {}", voice.token);
            Ok(())
        }
        Command::Hangup { session_id } => {
            let ended = api.end_voice_session(&session_id).await?;
            println!("{}", ended.message);
            Ok(())
        }
        Command::Transcript {
            conversation_id,
            path,
        } => transcript(api, &conversation_id, &path).await,
    }
}

async fn login(api: &ApiClient, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    api.login(email, &password).await?;

    // Only remember the account; environment overrides stay out of the file
    let mut stored = Config::load_file()?;
    stored.last_account = Some(email.to_string());
    if let Err(e) = stored.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {}.", email);
    Ok(())
}

async fn register(api: &ApiClient, email: &str, first_name: &str, last_name: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm password: ")
        .context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let profile = api.register(email, &password, first_name, last_name).await?;
    println!("Registered {} ({}). You can now log in.", profile.email, profile.id);
    Ok(())
}

fn status(api: &ApiClient, config: &Config) {
    let session = api.session().current();
    println!("Backend: {}", api.base_url());

    if !session.is_authenticated() {
        match &config.last_account {
            Some(account) => println!("Not logged in (last account: {}).", account),
            None => println!("Not logged in."),
        }
        return;
    }

    println!(
        "Logged in as {}.",
        session.account_id.as_deref().unwrap_or("unknown account")
    );
    match (session.expires_at, session.minutes_until_expiry()) {
        (Some(expires_at), Some(minutes)) => {
            let local = expires_at.with_timezone(&Local);
            let due = if session.needs_refresh() { " - refresh due" } else { "" };
            println!(
                "Access token expires at {} ({} min){}",
                local.format("%H:%M"),
                minutes,
                due
            );
        }
        _ => println!("Access token expiry unknown."),
    }
}

async fn refresh(api: &ApiClient) -> Result<()> {
    match api.refresh_session().await {
        Ok(()) => {
            println!("Access token refreshed.");
            Ok(())
        }
        Err(e) if e.forces_logout() => bail!("Session expired. Please log in again."),
        Err(e) => Err(e.into()),
    }
}

async fn conversations(api: &ApiClient) -> Result<()> {
    let conversations = api.fetch_conversations().await?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    for conversation in conversations.iter().filter(|c| !c.is_archived) {
        println!("{}  {}", conversation.id, conversation.display_title());
    }
    Ok(())
}

async fn messages(api: &ApiClient, conversation_id: &str) -> Result<()> {
    let messages = api.fetch_messages(conversation_id).await?;
    if messages.is_empty() {
        println!("No messages yet.");
    }
    for message in messages {
        println!("[{}] {}", message.role, message.content);
    }
    Ok(())
}

async fn transcript(api: &ApiClient, conversation_id: &str, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut bridge = TranscriptBridge::new();
    let mut posted = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let segment: TranscriptSegment = serde_json::from_str(&line)
            .with_context(|| format!("Invalid segment on line {}", index + 1))?;

        if let Some(message) = bridge.accept(&segment) {
            api.send_message(conversation_id, &message).await?;
            posted += 1;
        } else {
            debug!(segment_id = %segment.id, "Segment not posted");
        }
    }

    println!("Posted {} message(s).", posted);
    Ok(())
}
