use anyhow::{Context, Result};
use civic_assist_core::{
    ChatEvent, ChatMessage, ChatState, Config, Conversation, CycleOutcome, SendError,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so they never interleave with replies.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Could not load config, using defaults: {:#}", e);
        Config::new()
    });

    let mut conversation = Conversation::from_config(&config);
    let mut events = conversation.subscribe();
    let session = conversation.session_handle();

    let interrupt = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.close();
        }
    });

    println!("Civic helpdesk chat. /image <path> attaches a photo, /quit exits.\n");
    let mut buttons = Vec::new();
    if let Some(welcome) = conversation.messages().first() {
        print_message(welcome);
        buttons = welcome.buttons.clone().unwrap_or_default();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = session.closed() => break,
            line = lines.next_line() => line.context("Failed to read input")?,
        };
        let Some(line) = line else { break };
        let line = line.trim();

        if line == "/quit" {
            break;
        }
        if let Some(path) = image_command(line) {
            if path.is_empty() {
                println!("Usage: /image <path>");
                continue;
            }
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    conversation.attach_image(bytes);
                    println!("Image attached. Add a caption or press Enter to send.");
                }
                Err(e) => println!("Could not read {}: {}", path, e),
            }
            continue;
        }

        let text = match line.parse::<usize>() {
            Ok(n) if (1..=buttons.len()).contains(&n) => buttons[n - 1].clone(),
            _ => line.to_string(),
        };

        let outcome = {
            let send = conversation.send(&text);
            tokio::pin!(send);
            loop {
                tokio::select! {
                    outcome = &mut send => break outcome,
                    Some(event) = events.recv() => render_event(event)?,
                }
            }
        };
        while let Ok(event) = events.try_recv() {
            render_event(event)?;
        }

        match outcome {
            Ok(CycleOutcome::Streamed { .. }) => {
                println!("\n");
                buttons.clear();
            }
            Ok(CycleOutcome::Offline { id, .. }) | Ok(CycleOutcome::Image { id, .. }) => {
                if let Some(message) = conversation.message(id) {
                    print_message(message);
                    buttons = message.buttons.clone().unwrap_or_default();
                }
            }
            Ok(CycleOutcome::Abandoned) | Err(SendError::Closed) => break,
            Err(SendError::EmptyInput) => {}
            Err(e) => println!("{}", e),
        }
    }

    session.close();
    Ok(())
}

/// The path argument of an `/image` command, empty when none was given.
fn image_command(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("/image")?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

fn render_event(event: ChatEvent) -> Result<()> {
    match event {
        ChatEvent::StateChanged(ChatState::Streaming) => print!("Assistant: "),
        ChatEvent::MessageDelta { text, .. } => print!("{}", text),
        _ => return Ok(()),
    }
    std::io::stdout().flush()?;
    Ok(())
}

fn print_message(message: &ChatMessage) {
    println!("Assistant: {}", message.content);
    if let Some(buttons) = &message.buttons {
        for (i, label) in buttons.iter().enumerate() {
            println!("  [{}] {}", i + 1, label);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_command() {
        assert_eq!(image_command("/image photo.jpg"), Some("photo.jpg"));
        assert_eq!(image_command("/image   bin.png "), Some("bin.png"));
        assert_eq!(image_command("/image"), Some(""));
        assert_eq!(image_command("/imagefoo"), None);
        assert_eq!(image_command("where is the image?"), None);
    }
}
