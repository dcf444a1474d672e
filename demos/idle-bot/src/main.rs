//! Runs one offline-mode bot and prints what happens to it.
//!
//! ```text
//! idle-bot <username> <host[:port]>
//! ```
//!
//! Notifications are printed as JSON lines. Lines typed on stdin are sent
//! as chat, or as a command when they start with `/`. `.status` prints the
//! session snapshot and `.quit` (or Ctrl-C) stops the bot.

use mcbot::prelude::*;
use tokio::io::AsyncBufReadExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    mcbot::logging::init("info,mcbot_session=info");

    let mut args = std::env::args().skip(1);
    let (Some(username), Some(address)) = (args.next(), args.next()) else {
        eprintln!("usage: idle-bot <username> <host[:port]>");
        std::process::exit(2);
    };
    let target: Target = address.parse()?;
    let identity = Identity::new(username);

    let config = BotConfig::default().validated()?;
    let (bridge, mut notifications) = BotBridge::new(OfflineAuthProvider, config);
    bridge
        .execute(HostCommand::StartSession {
            identity: identity.clone(),
            target,
        })
        .await?;

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            notification = notifications.recv() => {
                let Some(notification) = notification else { break };
                println!("{}", serde_json::to_string(&notification)?);
                if matches!(notification, HostNotification::ReconnectAbandoned { .. }) {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !handle_line(&bridge, &identity, line.trim()).await {
                        break;
                    }
                }
                None => stdin_open = false,
            },
            _ = &mut ctrl_c => break,
        }
    }

    bridge.shutdown("bot stopped").await;
    Ok(())
}

/// Runs one console line. Returns `false` to quit.
async fn handle_line(bridge: &BotBridge<OfflineAuthProvider>, identity: &Identity, line: &str) -> bool {
    let command = match line {
        "" => return true,
        ".quit" => return false,
        ".status" => HostCommand::Status {
            identity: identity.clone(),
        },
        command if command.starts_with('/') => HostCommand::Send {
            identity: identity.clone(),
            intent: Intent::Command(command.to_string()),
        },
        chat => HostCommand::Send {
            identity: identity.clone(),
            intent: Intent::Chat(chat.to_string()),
        },
    };

    match bridge.execute(command).await {
        Ok(HostReply::Status { session }) => match serde_json::to_string_pretty(&session) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{e}"),
        },
        Ok(_) => {}
        Err(e) => eprintln!("{e}"),
    }
    true
}
