//! Tripagent - conversational flight and hotel planner
//!
//! CLI entry point for the chat loop and the offline scoring utility.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use tripagent::cli::{Cli, Command, OutputFormat};
use tripagent::config::Config;
use tripagent::dialogue::{DialogueError, DialogueState, DialogueStateMachine, HttpNlpExtractor, TurnOutcome};
use tripagent::domain::{Candidate, ExtractedFields, GoalProfile, Plan, Ranked, Tier, Weights};
use tripagent::gateway::RequestGateway;
use tripagent::planner::{HttpFlightSearch, HttpHotelSearch, PlanError, PlanningOrchestrator};
use tripagent::scoring;
use tripagent::session::{FileCredentialStore, HttpAuthClient, SessionTokenCoordinator};

fn setup_logging(level: &str) -> Result<()> {
    let log_path = tripagent::cli::get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;
    let directive = level.parse().unwrap_or_else(|_| tracing::Level::INFO.into());

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // CLI flag wins over the config file
    let level = cli
        .log_level
        .as_deref()
        .or(config.log_level.as_deref())
        .unwrap_or("info");
    setup_logging(level).context("Failed to setup logging")?;

    info!(
        "Tripagent loaded config: auth={}, search={}",
        config.auth.base_url, config.search.base_url
    );

    match cli.command {
        Some(Command::Chat) | None => cmd_chat(&config).await,
        Some(Command::Login { username }) => cmd_login(&config, username).await,
        Some(Command::Logout) => cmd_logout(&config),
        Some(Command::Score {
            file,
            budget,
            duration,
            amenities,
            format,
        }) => cmd_score(&file, budget, duration, amenities, format),
    }
}

/// Everything the chat loop needs, wired once per process
struct App {
    session: Arc<SessionTokenCoordinator>,
    machine: DialogueStateMachine,
    planner: Arc<PlanningOrchestrator>,
}

fn build_app(config: &Config) -> Result<App> {
    let store = Arc::new(FileCredentialStore::from_config(&config.storage));
    let auth = Arc::new(HttpAuthClient::from_config(&config.auth)?);
    let session = Arc::new(SessionTokenCoordinator::new(
        auth,
        store,
        Duration::from_millis(config.auth.refresh_timeout_ms),
    )?);

    let gateway = Arc::new(RequestGateway::from_config(&config.http, Arc::clone(&session))?);
    let extractor = Arc::new(HttpNlpExtractor::from_config(&config.nlp, Arc::clone(&gateway)));
    let planner = Arc::new(PlanningOrchestrator::new(
        Arc::new(HttpFlightSearch::from_config(&config.search, Arc::clone(&gateway))),
        Arc::new(HttpHotelSearch::from_config(&config.search, gateway)),
        Duration::from_millis(config.search.timeout_ms),
    ));
    let machine = DialogueStateMachine::new(extractor, Arc::clone(&planner));

    Ok(App {
        session,
        machine,
        planner,
    })
}

/// Log in to the travel backend
async fn cmd_login(config: &Config, username: Option<String>) -> Result<()> {
    let store = Arc::new(FileCredentialStore::from_config(&config.storage));
    let auth = Arc::new(HttpAuthClient::from_config(&config.auth)?);
    let session = Arc::new(SessionTokenCoordinator::new(
        auth,
        store,
        Duration::from_millis(config.auth.refresh_timeout_ms),
    )?);

    login_interactive(&session, username).await?;
    println!("{}", "Logged in.".green());
    Ok(())
}

/// Log out and discard stored credentials
fn cmd_logout(config: &Config) -> Result<()> {
    let store = FileCredentialStore::from_config(&config.storage);
    use tripagent::session::CredentialStore;
    store.clear().context("Failed to clear credentials")?;
    println!("Logged out.");
    Ok(())
}

/// Score and rank candidates from a JSON file, offline
fn cmd_score(
    file: &PathBuf,
    budget: Option<f64>,
    duration: Option<u32>,
    amenities: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let candidates: Vec<Candidate> = serde_json::from_str(&content).context("Failed to parse candidates")?;

    // The route fields never feed the score, only search; placeholders are fine
    let profile = GoalProfile {
        origin: String::new(),
        destination: String::new(),
        departure_date: chrono::Utc::now().date_naive(),
        return_date: None,
        passenger_count: 1,
        budget_max: budget,
        max_stops: None,
        preferred_duration_minutes: duration,
        min_rating: None,
        desired_amenities: amenities.into_iter().collect(),
        flight_weights: Weights::default_flight(),
        hotel_weights: Weights::default_hotel(),
    };

    let ranked = scoring::rank(candidates, &profile);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        OutputFormat::Text => {
            for (position, entry) in ranked.iter().enumerate() {
                print_ranked(position + 1, entry);
            }
        }
    }

    Ok(())
}

/// Run the interactive planning conversation
async fn cmd_chat(config: &Config) -> Result<()> {
    let app = build_app(config)?;

    println!("{}", "Tripagent".bold());
    println!("Tell me about your trip. Type /help for commands.\n");

    if !app.session.is_authenticated() {
        println!("You need to log in first.");
        login_interactive(&app.session, None).await?;
        println!("{}\n", "Logged in.".green());
    }

    loop {
        let Some(line) = prompt("> ")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/help" => print_help(),
            "/profile" => print_extracted(&app.machine.extracted()),
            "/reset" => match app.machine.reset() {
                Ok(()) => println!("Starting over. Where would you like to go?"),
                Err(e) => println!("{}", e.to_string().red()),
            },
            "/confirm" => handle_confirm(&app).await?,
            _ => handle_utterance(&app, line).await?,
        }
    }

    println!("Safe travels!");
    Ok(())
}

async fn handle_utterance(app: &App, text: &str) -> Result<()> {
    match app.machine.submit_utterance(text).await {
        Ok(outcome) => {
            let reply = describe_outcome(&outcome);
            println!("{reply}");
            app.machine.push_assistant_turn(reply);
        }
        Err(e) if is_session_expired(&e) => {
            println!("{}", "Your session has expired.".yellow());
            login_interactive(&app.session, None).await?;
            println!("Logged back in. Please repeat that last message.");
        }
        Err(e) => println!("{}", e.to_string().red()),
    }
    Ok(())
}

async fn handle_confirm(app: &App) -> Result<()> {
    match app.machine.confirm().await {
        Ok(plan) => print_plan(&plan),
        Err(DialogueError::Planning(PlanError::SessionExpired)) => {
            println!("{}", "Your session expired during the search.".yellow());
            login_interactive(&app.session, None).await?;

            // The profile froze at confirmation; replay the identical search
            if let Some(profile) = app.machine.frozen_profile() {
                println!("Retrying the search...");
                match app.planner.plan(&profile).await {
                    Ok(plan) => print_plan(&plan),
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
        }
        Err(e) => println!("{}", e.to_string().red()),
    }
    Ok(())
}

fn describe_outcome(outcome: &TurnOutcome) -> String {
    if outcome.state == DialogueState::Complete {
        let fields = &outcome.extracted;
        format!(
            "Got it: {} to {} on {}, {} traveler(s).{} Type /confirm to search, or keep refining.",
            fields.origin.as_deref().unwrap_or("?"),
            fields.destination.as_deref().unwrap_or("?"),
            fields
                .departure_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "?".to_string()),
            fields.passenger_count.unwrap_or(0),
            fields
                .budget_max
                .map(|b| format!(" Budget ${b:.0}."))
                .unwrap_or_default(),
        )
    } else {
        format!("I still need: {}.", outcome.missing.join(", "))
    }
}

fn is_session_expired(e: &DialogueError) -> bool {
    matches!(e, DialogueError::ExtractionUnavailable(inner) if inner.is_session_expired())
}

/// Prompt for credentials and establish a session
async fn login_interactive(session: &Arc<SessionTokenCoordinator>, username: Option<String>) -> Result<()> {
    let mut preset = username;
    loop {
        let username = match preset.take() {
            Some(name) => name,
            None => match prompt("Username: ")? {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => eyre::bail!("Login aborted"),
            },
        };
        let Some(password) = prompt("Password: ")? else {
            eyre::bail!("Login aborted");
        };

        match session.login(&username, password.trim()).await {
            Ok(()) => return Ok(()),
            Err(e) => println!("{}", format!("Login failed: {e}").red()),
        }
    }
}

fn prompt(text: &str) -> Result<Option<String>> {
    print!("{text}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    let read = std::io::stdin().read_line(&mut line)?;
    if read == 0 {
        // EOF
        return Ok(None);
    }
    Ok(Some(line))
}

fn print_help() {
    println!("Commands:");
    println!("  /confirm  Search with the collected trip details");
    println!("  /profile  Show what has been collected so far");
    println!("  /reset    Start a new conversation");
    println!("  /quit     Exit");
}

fn print_extracted(fields: &ExtractedFields) {
    fn show<T: std::fmt::Display>(name: &str, value: &Option<T>) {
        match value {
            Some(v) => println!("  {name}: {v}"),
            None => println!("  {name}: {}", "(not set)".dimmed()),
        }
    }

    show("origin", &fields.origin);
    show("destination", &fields.destination);
    show("departure-date", &fields.departure_date);
    show("return-date", &fields.return_date);
    show("passenger-count", &fields.passenger_count);
    show("budget-max", &fields.budget_max);
    show("max-stops", &fields.max_stops);
    show("preferred-duration-minutes", &fields.preferred_duration_minutes);
    show("min-rating", &fields.min_rating);
    if let Some(amenities) = &fields.desired_amenities {
        println!("  desired-amenities: {}", amenities.iter().cloned().collect::<Vec<_>>().join(", "));
    }
}

fn print_plan(plan: &Plan) {
    for warning in &plan.warnings {
        println!("{}", format!("! {warning}").yellow());
    }

    println!("\n{}", "Flights".bold());
    if plan.flights.is_empty() {
        println!("  (none found)");
    }
    for (position, entry) in plan.flights.iter().enumerate() {
        print_ranked(position + 1, entry);
    }

    println!("\n{}", "Hotels".bold());
    if plan.hotels.is_empty() {
        println!("  (none found)");
    }
    for (position, entry) in plan.hotels.iter().enumerate() {
        print_ranked(position + 1, entry);
    }
    println!();
}

fn print_ranked(position: usize, entry: &Ranked) {
    let tier = entry.breakdown.recommendation;
    let label = format!("{tier:?}");
    let label = match tier {
        Tier::Excellent => label.green(),
        Tier::Good => label.cyan(),
        Tier::Fair => label.yellow(),
        Tier::Poor => label.red(),
    };
    let price = entry
        .candidate
        .price()
        .map(|p| format!("${p:.0}"))
        .unwrap_or_else(|| "$?".to_string());

    println!(
        "  {position}. {} {} {} (utility {:.2})",
        entry.candidate.label(),
        price,
        label,
        entry.breakdown.total_utility
    );
}
