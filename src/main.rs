use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use devagent_cli::app::App;
use devagent_cli::session::{self, Session};
use devagent_cli::settings::{Settings, SettingsStore};
use devagent_cli::{handler, logging, tui, ui, CompletionClient, GeminiClient, TavilyClient};

#[derive(Parser)]
#[command(name = "devagent", version)]
#[command(about = "AI coding agent console: explanation on the left, implementation preview on the right")]
struct Cli {
    /// Model to use for this run (saved only by `config`)
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request and print the reply and extracted implementation
    Ask {
        /// Your request
        prompt: String,
    },
    /// Search the web with Tavily (needs a saved Tavily key)
    Search {
        /// Search query
        query: String,
    },
    /// Show or update saved settings (`--model` sets the default model)
    Config {
        /// Tavily API key for web search
        #[arg(long, conflicts_with = "clear_tavily_key")]
        tavily_key: Option<String>,
        /// Remove the saved Tavily API key
        #[arg(long)]
        clear_tavily_key: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is best effort; a read-only data dir shouldn't stop the app
    if let Err(e) = logging::init() {
        eprintln!("warning: logging disabled: {e}");
    }

    let store = SettingsStore::default_location()?;

    match cli.command {
        None => run_tui(run_settings(&store, cli.model), store).await,
        Some(Commands::Ask { prompt }) => ask(run_settings(&store, cli.model), &prompt).await,
        Some(Commands::Search { query }) => web_search(&run_settings(&store, cli.model), &query).await,
        // `config` saves the model instead of overriding it for one run
        Some(Commands::Config { tavily_key, clear_tavily_key }) => {
            configure(&store, store.load(), cli.model, tavily_key, clear_tavily_key)
        }
    }
}

/// Saved settings with the one-run `--model` override applied
fn run_settings(store: &SettingsStore, model: Option<String>) -> Settings {
    let mut settings = store.load();
    if let Some(model) = model {
        settings.model = model;
    }
    settings
}

async fn run_tui(settings: Settings, store: SettingsStore) -> Result<()> {
    let client = Arc::new(GeminiClient::from_env()?);
    if !client.has_api_key() {
        tracing::warn!("GEMINI_API_KEY is not set; requests will fail until it is");
    }
    tracing::info!(model = %settings.model, "starting TUI");

    let mut app = App::new(Session::new(settings), client, Some(store));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

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

async fn ask(settings: Settings, prompt: &str) -> Result<()> {
    let client = GeminiClient::from_env()?;
    let session = ask_once(&client, settings, prompt).await?;

    let placeholder = session::PREVIEW_PLACEHOLDER;
    if let Some(reply) = session.messages().last() {
        println!("{}", reply.content);
        if !reply.sources.is_empty() {
            println!("\nSources:");
            for source in &reply.sources {
                println!("  • {} - {}", source.title, source.url);
            }
        }
    }

    let preview = session.preview();
    if preview.code != placeholder {
        let lang = preview.language.as_deref().unwrap_or("code");
        println!("\n--- Implementation ({lang}) ---\n{}", preview.code);
    }

    Ok(())
}

/// Run one send. A failed completion is an error here, carrying the same
/// remediation text the console would show.
async fn ask_once(client: &dyn CompletionClient, settings: Settings, prompt: &str) -> Result<Session> {
    let mut session = Session::new(settings);
    let Some(history) = session.begin_send(prompt) else {
        bail!("Nothing to send: the prompt is empty");
    };

    let result = client.complete(&history, session.settings()).await;
    let failed = result.is_err();
    session.finish_send(result);

    if failed {
        let message = session.messages().last().map(|m| m.content.clone()).unwrap_or_default();
        bail!(message);
    }
    Ok(session)
}

async fn web_search(settings: &Settings, query: &str) -> Result<()> {
    let client = TavilyClient::new()?;
    let response = client.search(query, settings.tavily_key()).await?;

    if let Some(answer) = &response.answer {
        println!("{answer}\n");
    }

    if response.results.is_empty() {
        println!("No results found");
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        println!("{}. {} ({:.2})", i + 1, result.title, result.score);
        println!("   {}", result.url);
        let snippet: String = result.content.chars().take(200).collect();
        println!("   {}\n", snippet);
    }

    Ok(())
}

fn configure(
    store: &SettingsStore,
    mut settings: Settings,
    model: Option<String>,
    tavily_key: Option<String>,
    clear_tavily_key: bool,
) -> Result<()> {
    let changed = model.is_some() || tavily_key.is_some() || clear_tavily_key;

    if let Some(model) = model {
        settings.model = model;
    }
    if let Some(key) = tavily_key {
        settings.tavily_api_key = Some(key);
    }
    if clear_tavily_key {
        settings.tavily_api_key = None;
    }

    if changed {
        store.save(&settings)?;
        println!("Saved {}", store.path().display());
    }

    println!("model:      {}", settings.model);
    println!(
        "tavily key: {}",
        if settings.tavily_key().is_some() { "configured" } else { "not set" }
    );
    println!(
        "gemini key: {}",
        if std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("API_KEY").is_ok() {
            "from environment"
        } else {
            "not set (export GEMINI_API_KEY)"
        }
    );

    Ok(())
}
