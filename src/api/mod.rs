mod handlers;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::calendar::{ChineseLunarCalendar, LunarConverter, NoteStore};
use crate::db::Database;
use crate::files::FileLibraries;
use crate::notify::SqliteNotifier;
use crate::ports::local::LocalFileSystem;
use crate::ports::Clock;
use crate::retry::RetryPolicy;
use crate::todos::TodoList;

pub type SharedNoteStore = Arc<Mutex<NoteStore<Database, SqliteNotifier>>>;
pub type SharedTodoList = Arc<Mutex<TodoList<Database>>>;
pub type SharedFileLibraries = Arc<Mutex<FileLibraries<Database, LocalFileSystem>>>;

/// Stores and capabilities shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub notes: SharedNoteStore,
    pub todos: SharedTodoList,
    pub files: SharedFileLibraries,
    pub notifier: SqliteNotifier,
    pub clock: Arc<dyn Clock>,
    pub lunar: Arc<dyn LunarConverter>,
    /// Canonical directory that import sources must live under. `None`
    /// refuses every import.
    pub import_root: Option<PathBuf>,
}

impl AppState {
    /// Open every store over an already migrated database.
    pub fn new(db: Database, data_dir: &Path, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        let notifier = SqliteNotifier::new(db.clone(), clock.clone());
        let notes = NoteStore::open(db.clone(), notifier.clone(), retry);
        let todos = TodoList::open(db.clone(), retry);
        let files = FileLibraries::open(data_dir, db, LocalFileSystem, retry);

        Self {
            notes: Arc::new(Mutex::new(notes)),
            todos: Arc::new(Mutex::new(todos)),
            files: Arc::new(Mutex::new(files)),
            notifier,
            clock,
            lunar: Arc::new(ChineseLunarCalendar),
            import_root: None,
        }
    }

    /// Allow imports from files under `root`. A root that cannot be resolved
    /// leaves imports disabled.
    pub fn with_import_root(mut self, root: Option<&Path>) -> Self {
        self.import_root = root.and_then(|root| match root.canonicalize() {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::warn!(
                    "Import root {} is unusable, file imports disabled: {}",
                    root.display(),
                    e
                );
                None
            }
        });
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Notes
        .route("/notes", get(handlers::list_notes))
        .route(
            "/notes/{date_key}",
            get(handlers::get_note)
                .put(handlers::upsert_note)
                .delete(handlers::delete_note),
        )
        // Calendar
        .route("/calendar/{year}/{month}", get(handlers::get_month))
        .route("/lunar/{date_key}", get(handlers::get_lunar))
        // Todos
        .route("/todos", get(handlers::list_todos).post(handlers::create_todo))
        .route("/todos/{id}", delete(handlers::delete_todo))
        .route("/todos/{id}/toggle", post(handlers::toggle_todo))
        // Files
        .route(
            "/files/{kind}",
            get(handlers::list_files)
                .post(handlers::import_file)
                .delete(handlers::clear_files),
        )
        .route("/files/{kind}/info", get(handlers::get_library_info))
        .route(
            "/files/{kind}/{id}",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        // Reminders
        .route("/reminders", get(handlers::list_pending_reminders))
        .route("/reminders/due", post(handlers::deliver_due_reminders))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
