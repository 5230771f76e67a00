//! The menu shown when no subcommand is given.

use crate::{App, print_live_session, warn_on_unusual_extension};
use dialoguer::{Input, Select};
use eyre::WrapErr;
use std::path::PathBuf;
use youtube_publisher::{PrivacyStatus, VideoMetadata};

const MENU: [&str; 4] = ["Upload video", "Live streaming", "Log in again", "Exit"];

pub async fn run(app: &App) -> eyre::Result<()> {
    // authorize up front so the user sees the browser flow before any prompts
    app.handle(false).await?;
    println!("Authenticated with YouTube.");

    loop {
        let choice = Select::new()
            .with_prompt("What would you like to do?")
            .items(&MENU)
            .default(0)
            .interact()?;
        let outcome = match choice {
            0 => upload(app).await,
            1 => live(app).await,
            2 => app.handle(true).await.map(|_| println!("Authenticated with YouTube.")),
            _ => return Ok(()),
        };
        if let Err(e) = outcome {
            eprintln!("Error: {e:?}");
        }
    }
}

async fn upload(app: &App) -> eyre::Result<()> {
    let path: String = Input::new()
        .with_prompt("Video file")
        .validate_with(|input: &String| -> Result<(), String> {
            if PathBuf::from(input).is_file() {
                Ok(())
            } else {
                Err(format!("{input} is not a file"))
            }
        })
        .interact_text()?;
    let path = PathBuf::from(path);
    warn_on_unusual_extension(&path);

    let title: String = Input::new()
        .with_prompt("Title")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("please enter a title")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    let description: String = Input::new()
        .with_prompt("Description")
        .allow_empty(true)
        .interact_text()?;
    let privacy = PrivacyStatus::ALL[Select::new()
        .with_prompt("Privacy")
        .items(&PrivacyStatus::ALL)
        .default(1)
        .interact()?];

    let metadata = VideoMetadata {
        description,
        privacy_status: privacy,
        ..VideoMetadata::new(title)
    };
    let handle = app.handle(false).await?;
    let id = app
        .upload(handle, &path, metadata)
        .await
        .wrap_err("upload video")?;
    println!("Upload complete: {}", id.watch_url());
    Ok(())
}

async fn live(app: &App) -> eyre::Result<()> {
    let title: String = Input::new()
        .with_prompt("Stream title")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("please enter a title")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let handle = app.handle(false).await?;
    let result = app.provision(handle, &title).await?;
    print_live_session(&result);
    Ok(())
}
