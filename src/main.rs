use anyhow::{Result, anyhow, bail};
use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use liteadmin_cli::config::Settings;
use liteadmin_cli::db::StoreGateway;
use liteadmin_cli::logging;
use liteadmin_cli::tui::{App, run_app};
use liteadmin_cli::view::TableView;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "liteadmin-cli")]
#[command(about = "A terminal browser and editor for SQLite databases", long_about = None)]
struct Cli {
    /// Path to an existing SQLite database file
    #[arg(required_unless_present = "completions")]
    database: Option<PathBuf>,
    /// Rows per page (overrides the config file)
    #[arg(short, long)]
    page_size: Option<usize>,
    /// Load whole tables instead of paging
    #[arg(long)]
    all: bool,
    /// Read settings from this file instead of ~/.liteadmin-cli/config.json
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the table names and exit without starting the TUI
    #[arg(short, long)]
    list_tables: bool,
    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        generate_completions(shell);
        return Ok(());
    }

    let database = cli
        .database
        .clone()
        .ok_or_else(|| anyhow!("A database path is required"))?;
    let settings = load_settings(&cli)?;
    let _guard = logging::init(&settings.log_dir)?;

    let gateway = match StoreGateway::open(&database, settings.busy_timeout()).await {
        Ok(gateway) => gateway,
        Err(err) => {
            tracing::error!(error = %err, path = %database.display(), "could not open database");
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    };

    if cli.list_tables {
        list_tables(&gateway).await?;
    } else {
        run_tui(gateway, &settings, !cli.all).await?;
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    if let Some(page_size) = cli.page_size {
        if page_size == 0 {
            bail!("--page-size must be greater than 0");
        }
        settings.page_size = page_size;
    }

    Ok(settings)
}

async fn list_tables(gateway: &StoreGateway) -> Result<()> {
    let tables = gateway.list_tables().await?;

    if tables.is_empty() {
        println!("No tables found.");
    } else {
        println!("Tables:");
        for table in tables {
            println!("- {}", table);
        }
    }

    Ok(())
}

async fn run_tui(gateway: StoreGateway, settings: &Settings, paginate: bool) -> Result<()> {
    let view = TableView::new(gateway, settings.page_size, paginate);
    let mut app = App::new(view, settings);
    app.load_tables().await;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = %err, "terminal loop failed");
        eprintln!("Error: {:#?}", err);
    }

    Ok(())
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
