use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pal_pan::api::{self, AppState};
use pal_pan::calendar::{
    picker_years, render_month, CalendarCursor, ChineseLunarCalendar, LunarConverter, LunarInfo, NoteStore,
    YearMonth,
};
use pal_pan::config::AppConfig;
use pal_pan::db::Database;
use pal_pan::files::{format_file_size, FileLibrary};
use pal_pan::models::{DateKey, ImportFileInput, LibraryKind};
use pal_pan::notify::SqliteNotifier;
use pal_pan::ports::local::{LocalFileSystem, SystemClock};
use pal_pan::ports::Clock;
use pal_pan::todos::TodoList;

#[derive(Parser)]
#[command(name = "palpan")]
#[command(about = "Calendar notes with lunar dates and 07:00 reminders")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Read and write the note of a day
    #[command(subcommand)]
    Note(NoteCommand),
    /// Print the calendar grid of a month
    Month(MonthArgs),
    /// Convert a date to the Chinese lunar calendar
    Lunar {
        /// Date as YYYY-M-D (defaults to today)
        date: Option<DateKey>,
    },
    /// Manage the task list
    #[command(subcommand)]
    Todo(TodoCommand),
    /// Manage a file library (uploads, images or pdfs)
    Files {
        #[arg(value_parser = parse_library_kind)]
        kind: LibraryKind,
        #[command(subcommand)]
        command: FilesCommand,
    },
    /// Inspect and deliver reminder notifications
    #[command(subcommand)]
    Reminders(RemindersCommand),
}

#[derive(Subcommand)]
enum NoteCommand {
    /// Save the note of a day; blank text deletes it
    Set {
        date: DateKey,
        text: String,
        /// Schedule a 07:00 reminder on that day
        #[arg(short, long)]
        remind: bool,
    },
    /// Show the note of a day
    Get { date: DateKey },
    /// Delete the note of a day
    Delete { date: DateKey },
    /// List every note in date order
    List,
}

#[derive(Args)]
struct MonthArgs {
    /// Year to show (defaults to the current year)
    year: Option<i32>,
    /// Month to show, 1-12 (defaults to the current month)
    month: Option<u32>,
    /// Move the displayed month by this many months
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<i32>,
    /// Day to highlight
    #[arg(short, long)]
    selected: Option<DateKey>,
    /// Print the grid as JSON
    #[arg(long)]
    json: bool,
    /// List the years offered by the year picker instead
    #[arg(long)]
    years: bool,
}

#[derive(Subcommand)]
enum TodoCommand {
    /// Add a task
    Add { text: String },
    /// List tasks
    List,
    /// Flip a task between done and not done
    Toggle { id: Uuid },
    /// Delete a task
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum FilesCommand {
    /// Copy a file into the library
    Import {
        source: PathBuf,
        /// Original file name (defaults to the source's name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mime: Option<String>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// List stored files, newest first
    List,
    /// Delete a stored file and its thumbnail
    Delete { id: String },
    /// Delete every stored file
    Clear,
    /// Show the library directory and totals
    Info,
}

#[derive(Subcommand)]
enum RemindersCommand {
    /// List reminders that have not fired yet
    Pending,
    /// Deliver every reminder whose time has come
    Due,
}

fn parse_library_kind(s: &str) -> Result<LibraryKind, String> {
    LibraryKind::from_str(s).ok_or_else(|| format!("unknown library '{}' (uploads, images, pdfs)", s))
}

/// Initialize tracing with output to stderr (for one-shot commands) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "pal_pan=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // Commands print their results on stdout, keep logs out of it
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = config.resolved_database_path()?;
    let db = Database::open(path)?;
    db.migrate().context("Failed to run database migrations")?;
    Ok(db)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(use_stderr);

    let config = AppConfig::load();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Some(Commands::Serve { port }) => serve(&config, clock, port).await?,
        None => serve(&config, clock, None).await?,
        Some(Commands::Note(command)) => run_note(&config, clock, command)?,
        Some(Commands::Month(args)) => run_month(&config, clock, args)?,
        Some(Commands::Lunar { date }) => {
            let date = date.map(|key| key.date()).unwrap_or_else(|| clock.today());
            let lunar = ChineseLunarCalendar.to_lunar(date)?;
            let info = LunarInfo::from(lunar);
            println!(
                "{} -> lunar {}-{}-{}{} ({}月{})",
                DateKey::from_date(date),
                info.date.year,
                info.date.month,
                info.date.day,
                if info.date.is_leap_month { " leap" } else { "" },
                info.month_in_chinese,
                info.day_in_chinese
            );
        }
        Some(Commands::Todo(command)) => run_todo(&config, command)?,
        Some(Commands::Files { kind, command }) => run_files(&config, kind, command)?,
        Some(Commands::Reminders(command)) => {
            let db = open_database(&config)?;
            let notifier = SqliteNotifier::new(db, clock);
            let triggers = match command {
                RemindersCommand::Pending => notifier.pending()?,
                RemindersCommand::Due => notifier.deliver_due()?,
            };
            if triggers.is_empty() {
                println!("No reminders.");
            }
            for trigger in triggers {
                println!("{}  {}  {}", trigger.fire_at, trigger.id, trigger.body);
            }
        }
    }

    Ok(())
}

async fn serve(config: &AppConfig, clock: Arc<dyn Clock>, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.port);
    tracing::info!("Starting pal-pan server on port {}", port);

    let db = open_database(config)?;
    let data_dir = config.resolved_data_dir()?;
    let state = AppState::new(db, &data_dir, clock, config.retry_policy())
        .with_import_root(config.import_root.as_deref());
    if state.import_root.is_none() {
        tracing::info!("No import_root configured, file imports over HTTP are disabled");
    }

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("pal-pan server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_note(config: &AppConfig, clock: Arc<dyn Clock>, command: NoteCommand) -> Result<()> {
    let db = open_database(config)?;
    let notifier = SqliteNotifier::new(db.clone(), clock);
    let mut store = NoteStore::open(db, notifier, config.retry_policy());

    match command {
        NoteCommand::Set { date, text, remind } => {
            let outcome = store.upsert(date, &text, remind)?;
            if let Some(warning) = outcome.warning() {
                eprintln!("warning: {}", warning);
            }
            print_json(&outcome)?;
        }
        NoteCommand::Get { date } => match store.get(&date) {
            Some(record) => print_json(&record)?,
            None => bail!("No note on {}", date),
        },
        NoteCommand::Delete { date } => match store.delete(&date)? {
            Some(record) => println!("Deleted note on {}", record.date_key),
            None => println!("No note on {}", date),
        },
        NoteCommand::List => print_json(&store.records())?,
    }
    Ok(())
}

fn run_month(config: &AppConfig, clock: Arc<dyn Clock>, args: MonthArgs) -> Result<()> {
    let today = clock.today();
    if args.years {
        let years: Vec<String> = picker_years(today).iter().map(i32::to_string).collect();
        println!("{}", years.join(" "));
        return Ok(());
    }

    let mut cursor = CalendarCursor::at(today);

    if args.year.is_some() || args.month.is_some() {
        let year = args.year.unwrap_or(cursor.displayed.year());
        let month = args.month.unwrap_or(cursor.displayed.month());
        let Some(month) = YearMonth::new(year, month) else {
            bail!("Invalid month {}-{}", year, month);
        };
        cursor.select_month_year(month);
    }
    if let Some(offset) = args.offset {
        cursor.change_month(offset);
    }
    if let Some(selected) = args.selected {
        cursor.select(selected.date());
    }

    let db = open_database(config)?;
    let notifier = SqliteNotifier::new(db.clone(), clock);
    let store = NoteStore::open(db, notifier, config.retry_policy());
    let view = cursor.view(today, &store, &ChineseLunarCalendar);

    if args.json {
        print_json(&view)?;
    } else {
        print!("{}", render_month(&view));
    }
    Ok(())
}

fn run_todo(config: &AppConfig, command: TodoCommand) -> Result<()> {
    let db = open_database(config)?;
    let mut todos = TodoList::open(db, config.retry_policy());

    match command {
        TodoCommand::Add { text } => {
            let item = todos.add(&text)?;
            println!("Added {}  {}", item.id, item.text);
        }
        TodoCommand::List => {
            for item in todos.items() {
                let mark = if item.completed { "x" } else { " " };
                println!("[{}] {}  {}", mark, item.id, item.text);
            }
            let stats = todos.stats();
            println!("{}/{} done", stats.completed, stats.total);
        }
        TodoCommand::Toggle { id } => match todos.toggle(id)? {
            Some(item) => {
                let state = if item.completed { "done" } else { "not done" };
                println!("{} is {}", item.text, state);
            }
            None => bail!("No task {}", id),
        },
        TodoCommand::Delete { id } => {
            if !todos.delete(id)? {
                bail!("No task {}", id);
            }
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

fn run_files(config: &AppConfig, kind: LibraryKind, command: FilesCommand) -> Result<()> {
    let db = open_database(config)?;
    let data_dir = config.resolved_data_dir()?;
    let mut library = FileLibrary::open(
        kind,
        &data_dir,
        db,
        LocalFileSystem,
        config.retry_policy(),
    );

    match command {
        FilesCommand::Import {
            source,
            name,
            mime,
            width,
            height,
        } => {
            let file_name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let stored = library.import(ImportFileInput {
                source_path: source.display().to_string(),
                file_name,
                mime_type: mime,
                width,
                height,
            })?;
            println!(
                "Imported {} ({})",
                stored.stored_path,
                format_file_size(stored.file_size)
            );
        }
        FilesCommand::List => {
            for file in library.files() {
                println!(
                    "{}  {}  {}  {}",
                    file.id,
                    file.uploaded_at.format("%Y-%m-%d %H:%M"),
                    format_file_size(file.file_size),
                    file.original_path
                );
            }
        }
        FilesCommand::Delete { id } => {
            if !library.delete(&id)? {
                bail!("No file {} in {}", id, kind.as_str());
            }
            println!("Deleted {}", id);
        }
        FilesCommand::Clear => {
            let removed = library.clear()?;
            println!("Removed {} files from {}", removed, kind.as_str());
        }
        FilesCommand::Info => {
            let info = library.directory_info();
            println!("Directory: {}", info.path);
            println!("Exists:    {}", info.exists);
            println!("Files:     {}", info.file_count);
            println!("Size:      {}", format_file_size(library.total_size()));
        }
    }
    Ok(())
}
