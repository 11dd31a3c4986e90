use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use helix_outreach::{logging, ApiClient, Config, Controller, MessageKind, Provider, UserId};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "helix")]
#[command(about = "Terminal client for the Helix recruiting outreach agent")]
#[command(version)]
struct Args {
    /// Backend base URL, e.g. http://127.0.0.1:5000/api
    #[arg(long)]
    api_url: Option<String>,

    /// Model provider: openai or gemini
    #[arg(long, value_parser = parse_provider)]
    provider: Option<Provider>,

    /// Model name passed through to the backend
    #[arg(long)]
    model: Option<String>,

    /// Write logs here instead of the default location
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Send one message, print the conversation and sequence, then exit
    #[arg(long)]
    prompt: Option<String>,
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    Provider::from_str(value).ok_or_else(|| {
        let known: Vec<&str> = Provider::all().iter().map(|p| p.as_str()).collect();
        format!("unknown provider '{}' (expected one of: {})", value, known.join(", "))
    })
}

fn load_config(args: &Args) -> Config {
    let mut config = Config::load().unwrap_or_else(|_| Config::new()).with_env();

    if let Some(url) = &args.api_url {
        config.api_url = Some(url.clone());
    }
    if let Some(provider) = args.provider {
        config.provider = Some(provider.as_str().to_string());
    }
    if let Some(model) = &args.model {
        config.model_name = Some(model.clone());
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args);

    let log_path = match &args.log_file {
        Some(path) => path.clone(),
        None => Config::default_log_path()?,
    };
    logging::init(&log_path)
        .with_context(|| format!("could not open log file {}", log_path.display()))?;

    let user_id = UserId::generate();
    info!(
        user_id = %user_id,
        provider = %config.provider(),
        api_url = config.api_url(),
        "starting helix"
    );

    if let Some(prompt) = &args.prompt {
        return run_once(&config, user_id, prompt).await;
    }

    let result = run_tui(&config, user_id).await;
    if let Err(err) = &result {
        error!(error = %err, "tui exited with error");
    }
    result
}

/// Headless mode: one exchange, printed to stdout
async fn run_once(config: &Config, user_id: UserId, prompt: &str) -> Result<()> {
    let api = ApiClient::new(config.api_url());
    let mut controller = Controller::new(user_id, config.provider());
    controller.set_model_name(config.model_name.clone());

    controller
        .send_message(&api, prompt)
        .await
        .map_err(|rejected| anyhow!("message not sent: {rejected}"))?;

    for msg in controller.messages() {
        let role = match msg.kind {
            MessageKind::User => "you",
            MessageKind::Assistant => "helix",
            MessageKind::Status => "status",
        };
        println!("[{}] {}", role, msg.content);
    }

    match controller.sequence() {
        Some(sequence) if !sequence.is_empty() => {
            println!();
            println!("Sequence:");
            for step in &sequence.steps {
                println!();
                println!("Step {}", step.step);
                println!("{}", step.content);
            }
        }
        _ => {
            println!();
            println!("No sequence generated.");
        }
    }

    Ok(())
}

async fn run_tui(config: &Config, user_id: UserId) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = tui::EventHandler::new();
    let mut app = App::new(config, user_id, events.sender());
    app.check_backend();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            if let Some(event) = events.next().await {
                handler::handle_event(&mut app, event).await?;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}
