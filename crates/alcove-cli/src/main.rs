//! Headless shell around the session core. The graphical portal is a
//! separate frontend; this binary exists so a session is fully drivable
//! from a terminal.

use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use url::Url;

use alcove_crypto::generate_token;
use alcove_session::{Config, PortalTab, SessionManager, SessionState, invite};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alcove=info".into()),
        )
        .init();

    let config = Config::from_env();
    let app_base: Url = std::env::var("ALCOVE_APP_URL")
        .unwrap_or_else(|_| "https://alcove.example/app".into())
        .parse()?;
    let author = std::env::var("ALCOVE_AUTHOR").unwrap_or_else(|_| "anonymous".into());

    let manager = SessionManager::from_config(&config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if manager.resume().await.unwrap_or(false) {
        println!("Resumed previous session.");
    } else {
        enter_session(&manager, &mut lines).await?;
    }
    if manager.state().await != SessionState::Authenticated {
        return Ok(());
    }

    println!(
        "Commands: send <text> | msgs | files | upload <path> | download <n> <dest> | \
         rmmsg <n> | rmfile <n> | clear | invite | logout | quit"
    );

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

        let outcome: Result<(), alcove_session::SessionError> = match cmd {
            "" => Ok(()),
            "send" => manager.send_message(&author, rest).await.map(|_| ()),
            "msgs" => {
                match manager.snapshot().await {
                    Ok(snapshot) => {
                        for (index, message) in snapshot.messages.iter().enumerate() {
                            let text = manager
                                .read_message(message)
                                .await
                                .unwrap_or_else(|_| "<unreadable>".into());
                            println!("[{index}] {} ({}): {}", message.author, message.sent_at, text);
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
                Ok(())
            }
            "files" => {
                match manager.snapshot().await {
                    Ok(snapshot) => {
                        for (index, file) in snapshot.files.iter().enumerate() {
                            println!(
                                "[{index}] {} ({} bytes, {}) from {}",
                                file.name, file.size_bytes, file.mime_type, file.uploaded_by
                            );
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
                Ok(())
            }
            "upload" => match tokio::fs::read(rest).await {
                Ok(bytes) => {
                    let name = Path::new(rest)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("file.bin");
                    manager
                        .upload_file(&author, name, "application/octet-stream", &bytes)
                        .await
                        .map(|_| ())
                }
                Err(e) => {
                    println!("cannot read {rest}: {e}");
                    Ok(())
                }
            },
            "download" => {
                let mut parts = rest.split_whitespace();
                match (
                    parts.next().and_then(|n| n.parse::<usize>().ok()),
                    parts.next(),
                ) {
                    (Some(index), Some(dest)) => match manager.snapshot().await {
                        Ok(snapshot) => match snapshot.files.get(index) {
                            Some(record) => match manager.download_file(record).await {
                                Ok(bytes) => {
                                    tokio::fs::write(dest, bytes).await?;
                                    println!("saved {} to {dest}", record.name);
                                    Ok(())
                                }
                                Err(e) => Err(e),
                            },
                            None => {
                                println!("no file [{index}]");
                                Ok(())
                            }
                        },
                        Err(e) => Err(e),
                    },
                    _ => {
                        println!("usage: download <n> <dest>");
                        Ok(())
                    }
                }
            }
            "rmmsg" => delete_indexed(&manager, rest, true).await,
            "rmfile" => delete_indexed(&manager, rest, false).await,
            "clear" => manager.clear_messages().await,
            "invite" => match manager.invite(&app_base, PortalTab::Messages).await {
                Ok(link) => {
                    println!("{link}");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            "logout" => {
                manager.logout().await?;
                println!("Left the session. Records remain for other participants.");
                break;
            }
            "quit" => break,
            other => {
                println!("unknown command: {other}");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("error: {e}");
        }
    }

    Ok(())
}

/// Prompt until a token gets the user into a session. Pasting an invite
/// link pre-fills its token but still requires an explicit yes.
async fn enter_session(
    manager: &SessionManager,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    println!("Enter a session token (blank to generate one), or paste an invite link:");

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();

        let token = if input.is_empty() {
            let token = generate_token();
            println!("Generated token: {token}");
            token
        } else if let Some(found) = invite::decode(input) {
            println!("Invite link for token '{}'. Type yes to join it.", found.token);
            match lines.next_line().await? {
                Some(answer) if answer.trim().eq_ignore_ascii_case("yes") => found.token,
                _ => {
                    println!("Not joining. Enter a token:");
                    continue;
                }
            }
        } else {
            input.to_string()
        };

        match manager.login(&token).await {
            Ok(()) => {
                println!("Joined. Share the token (or an invite link) to let others in.");
                break;
            }
            Err(e) => println!("Cannot join: {e}. Try again:"),
        }
    }
    Ok(())
}

async fn delete_indexed(
    manager: &SessionManager,
    rest: &str,
    message: bool,
) -> Result<(), alcove_session::SessionError> {
    let Some(index) = rest.trim().parse::<usize>().ok() else {
        println!("usage: {} <n>", if message { "rmmsg" } else { "rmfile" });
        return Ok(());
    };

    let snapshot = manager.snapshot().await?;
    if message {
        match snapshot.messages.get(index) {
            Some(target) => manager.delete_message(target.id).await,
            None => {
                println!("no message [{index}]");
                Ok(())
            }
        }
    } else {
        match snapshot.files.get(index) {
            Some(target) => manager.delete_file(target.id).await,
            None => {
                println!("no file [{index}]");
                Ok(())
            }
        }
    }
}
