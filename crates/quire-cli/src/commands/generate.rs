//! Generate command implementation.

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;

use quire_http::{AuthSession, GenerateRequest, StreamStatus, StreamingSession};

use crate::output;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Project to generate for
    #[arg(long)]
    pub project_id: String,

    /// Instruction for the model
    #[arg(long)]
    pub prompt: String,

    /// Section being written
    #[arg(long)]
    pub section_id: Option<String>,

    /// Extra context passed to the model
    #[arg(long)]
    pub context: Option<String>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    /// Section level (L1-L5)
    #[arg(long, default_value = "L3")]
    pub section_level: String,

    /// Maximum tokens to generate
    #[arg(long, default_value_t = 4096)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Print the final snapshot as JSON instead of streaming text
    #[arg(long)]
    pub json: bool,
}

impl GenerateArgs {
    fn to_request(&self) -> GenerateRequest {
        let mut request = GenerateRequest::new(&self.project_id, &self.prompt);
        if let Some(section) = &self.section_id {
            request = request.with_section(section);
        }
        if let Some(context) = &self.context {
            request = request.with_context(context);
        }
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }
        request.section_level = self.section_level.clone();
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request
    }
}

pub async fn run(args: GenerateArgs, session: AuthSession) -> Result<()> {
    let streaming = StreamingSession::new(session);
    let request = args.to_request();

    if !args.json {
        eprintln!("{}", "Generating... (Ctrl+C to stop)".dimmed());
    }

    let mut updates = streaming.subscribe();
    let mut task = {
        let streaming = streaming.clone();
        tokio::spawn(async move { streaming.generate(&request).await })
    };

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut interrupted = false;
    let mut printed = 0;

    let status = loop {
        tokio::select! {
            result = &mut task => break result.context("Generation task failed")?,
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                streaming.cancel();
            }
            Ok(()) = updates.changed() => {
                if !args.json {
                    let content = updates.borrow_and_update().content.clone();
                    print_new(&content, &mut printed)?;
                }
            }
        }
    };

    let snapshot = streaming.snapshot();
    if args.json {
        return output::json(&serde_json::json!({
            "status": snapshot.status.to_string(),
            "content": snapshot.content,
            "error": snapshot.error,
        }));
    }

    print_new(&snapshot.content, &mut printed)?;
    if printed > 0 {
        println!();
    }

    match status {
        StreamStatus::Completed => {
            eprintln!("{}", "Done.".dimmed());
            Ok(())
        }
        StreamStatus::Cancelled => {
            eprintln!("{}", "Cancelled.".yellow());
            Ok(())
        }
        _ => bail!(
            "Generation failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Print the part of `content` not yet written.
fn print_new(content: &str, printed: &mut usize) -> Result<()> {
    if let Some(new) = content.get(*printed..)
        && !new.is_empty()
    {
        let mut stdout = io::stdout().lock();
        stdout.write_all(new.as_bytes())?;
        stdout.flush()?;
        *printed = content.len();
    }
    Ok(())
}
