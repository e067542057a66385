// src/main.rs

use clap::Parser;
use color_eyre::eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vanguard_recon::core::models::RunOutcome;
use vanguard_recon::{export, logging, Config, Orchestrator, Target};

mod app;
mod ui;

use app::{App, AppState};

/// OSINT reconnaissance for a domain, host, URL or IP address.
#[derive(Parser, Debug)]
#[command(name = "vanguard-recon", version, about)]
struct Cli {
    /// Target to analyze. Without it the interactive interface starts.
    target: Option<String>,

    /// Write the JSON report to PATH.
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Write the flattened CSV report to PATH.
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Configuration file (TOML).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum number of in-flight network calls.
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Also print log events to stderr (headless mode only).
    #[arg(short, long)]
    verbose: bool,
}

type ScanMessage = std::result::Result<RunOutcome, String>;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::initialize_logging(cli.verbose && cli.target.is_some())?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
        config.validate()?;
    }

    match cli.target.clone() {
        Some(target) => run_headless(&target, &cli, config).await,
        None => run_tui(config).await,
    }
}

async fn run_headless(input: &str, cli: &Cli, config: Config) -> Result<()> {
    let orchestrator = Orchestrator::live(&config)?;
    let cancel = CancellationToken::new();

    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, cancelling analysis.");
            on_ctrl_c.cancel();
        }
    });

    println!("[*] Analyzing {input} ...");
    let outcome = orchestrator.analyze(input, cancel).await?;
    print_summary(&outcome);

    let flattener = config.flattener();
    if cli.json.is_none() && cli.csv.is_none() {
        let target = Target::parse(input)?;
        let stem = export::default_stem(&target);
        let (json_path, csv_path) = export::export_all(&outcome.report, &flattener, &PathBuf::from("."), &stem)?;
        println!("\n[+] Results saved:\n    - {}\n    - {}", json_path.display(), csv_path.display());
        return Ok(());
    }
    if let Some(path) = &cli.json {
        export::write_json(&outcome.report, path)?;
        println!("[+] JSON saved to {}", path.display());
    }
    if let Some(path) = &cli.csv {
        export::write_csv(&outcome.report, &flattener, path)?;
        println!("[+] CSV saved to {}", path.display());
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    println!("\n=== {} ===", outcome.summary);
    for section in &outcome.summary.succeeded {
        println!("  ✓ {section}");
    }
    for (section, kind) in &outcome.summary.failed {
        println!("  ✗ {section} ({kind})");
    }
}

async fn run_tui(config: Config) -> Result<()> {
    let orchestrator = Arc::new(Orchestrator::live(&config)?);

    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut app = App::new(config.flattener());
    let (tx, mut rx) = mpsc::channel::<ScanMessage>(1);
    let result = event_loop(&mut terminal, &mut app, &orchestrator, &tx, &mut rx).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
    orchestrator: &Arc<Orchestrator>,
    tx: &mpsc::Sender<ScanMessage>,
    rx: &mut mpsc::Receiver<ScanMessage>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            handle_events(app, orchestrator, tx)?;
        }

        if let Ok(message) = rx.try_recv() {
            app.finish(message);
        }
        app.on_tick();
    }
    Ok(())
}

fn handle_events(app: &mut App, orchestrator: &Arc<Orchestrator>, tx: &mpsc::Sender<ScanMessage>) -> Result<()> {
    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            match app.state {
                AppState::Idle => handle_idle_input(app, key.code, orchestrator, tx),
                AppState::Finished => handle_finished_input(app, key.code),
                AppState::Scanning => match key.code {
                    KeyCode::Char('c') | KeyCode::Char('C') => app.cancel_scan(),
                    KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_logs(),
                    KeyCode::Char('q') | KeyCode::Char('Q') => {
                        app.cancel_scan();
                        app.quit();
                    }
                    _ => {}
                },
            }
        }
    }
    Ok(())
}

fn handle_idle_input(app: &mut App, key_code: KeyCode, orchestrator: &Arc<Orchestrator>, tx: &mpsc::Sender<ScanMessage>) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => {
            if app.input.trim().is_empty() {
                return;
            }
            let cancel = app.start_scan();
            let orchestrator = orchestrator.clone();
            let tx = tx.clone();
            let input = app.input.clone();
            tokio::spawn(async move {
                let message = orchestrator.analyze(&input, cancel).await.map_err(|e| {
                    error!(error = %e, "Analysis rejected.");
                    e.to_string()
                });
                let _ = tx.send(message).await;
            });
        }
        _ => {}
    }
}

fn handle_finished_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
        KeyCode::Char('n') | KeyCode::Char('N') => app.reset(),
        KeyCode::Char('e') | KeyCode::Char('E') => {
            let dir = logging::get_data_dir().join("exports");
            app.export_to(&dir);
        }
        KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_logs(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::Left => app.scroll_logs_left(),
        KeyCode::Right => app.scroll_logs_right(),
        _ => {}
    }
}
