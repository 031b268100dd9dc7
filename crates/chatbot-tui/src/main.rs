use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatbot_core::{Config, Conversation, OpenAIClient};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "chatbot", version)]
#[command(about = "Chat with an OpenAI-compatible model from the terminal")]
struct Cli {
    /// API key for the completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Model to use (overrides the saved setting)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Base URL of the chat completions API
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Send one message and print the reply
    Ask {
        /// Your message
        message: String,
    },
    /// Show settings, or save any of --model, --base-url, --timeout, --greeting
    Config {
        /// Greeting shown at the start of each chat
        #[arg(long)]
        greeting: Option<String>,
    },
}

/// Effective settings after layering CLI flags over the settings file
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    model: String,
    base_url: String,
    timeout: Duration,
    greeting: String,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            model: cli.model.clone().unwrap_or_else(|| config.model().to_string()),
            base_url: cli.base_url.clone().unwrap_or_else(|| config.base_url().to_string()),
            timeout: cli.timeout.map(Duration::from_secs).unwrap_or_else(|| config.timeout()),
            greeting: config.greeting().to_string(),
        }
    }

    fn conversation(&self, api_key: &str) -> Conversation {
        let client = OpenAIClient::new(api_key)
            .with_base_url(&self.base_url)
            .with_model(&self.model)
            .with_timeout(self.timeout);
        Conversation::new(Arc::new(client), self.greeting.clone())
    }
}

fn api_key(cli: &Cli) -> Result<&str> {
    cli.api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("No API key configured. Set OPENAI_API_KEY or pass --api-key"))
}

/// Log to a file for the TUI (stderr is the terminal backend), to stderr otherwise
fn init_logging(to_file: bool) -> Result<()> {
    let default_filter = if to_file {
        "chatbot=info,chatbot_core=info"
    } else {
        "chatbot=warn,chatbot_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if to_file {
        let log_dir = Config::config_dir()?;
        std::fs::create_dir_all(&log_dir)?;
        let log_path = log_dir.join("chatbot.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("opening log file {}", log_path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let interactive = matches!(cli.command, None | Some(Commands::Chat));
    init_logging(interactive)?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load settings, using defaults");
        Config::new()
    });

    match &cli.command {
        None | Some(Commands::Chat) => {
            let settings = Settings::resolve(&cli, &config);
            let conversation = settings.conversation(api_key(&cli)?);
            run_tui(conversation).await
        }
        Some(Commands::Ask { message }) => {
            let settings = Settings::resolve(&cli, &config);
            let conversation = settings.conversation(api_key(&cli)?);
            run_ask(conversation, message).await
        }
        Some(Commands::Config { greeting }) => run_config(&cli, config, greeting.clone()),
    }
}

async fn run_tui(conversation: Conversation) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let mut app = App::new(conversation, events.sender());

    tracing::info!(model = %app.conversation.model(), "chat session started");

    let result = run_event_loop(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;
    result
}

async fn run_event_loop(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

async fn run_ask(mut conversation: Conversation, message: &str) -> Result<()> {
    let Some(exchange) = conversation.begin(message) else {
        bail!("Message is empty");
    };

    let outcome = exchange.send().await;
    let failed = outcome.is_err();
    conversation.resolve(outcome);

    if let Some(reply) = conversation.transcript().last() {
        println!("{}", reply.content);
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_config(cli: &Cli, mut config: Config, greeting: Option<String>) -> Result<()> {
    let changed = cli.model.is_some()
        || cli.base_url.is_some()
        || cli.timeout.is_some()
        || greeting.is_some();

    if changed {
        if let Some(model) = &cli.model {
            config.default_model = Some(model.clone());
        }
        if let Some(base_url) = &cli.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_secs = Some(timeout);
        }
        if greeting.is_some() {
            config.greeting = greeting;
        }
        config.save()?;
        tracing::info!("settings saved");
    }

    println!("Settings file: {}", Config::get_config_path()?.display());
    println!("  model:    {}", config.model());
    println!("  base url: {}", config.base_url());
    println!("  timeout:  {}s", config.timeout().as_secs());
    println!("  greeting: {}", config.greeting());
    println!(
        "  API key:  {}",
        if api_key(cli).is_ok() { "set" } else { "not set" }
    );

    Ok(())
}
