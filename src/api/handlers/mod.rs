use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::calendar::{
    build_month_view, LunarInfo, MonthView, NoteStoreError, UpsertOutcome, YearMonth,
};
use crate::files::{format_file_size, FileLibraryError};
use crate::models::*;
use crate::ports::Trigger;
use crate::todos::TodoError;

type ApiError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side; clients only see a generic message.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    let msg = e.to_string();
    tracing::warn!("Validation error: {}", msg);
    (StatusCode::BAD_REQUEST, msg)
}

fn forbidden(msg: String) -> ApiError {
    tracing::warn!("Refused: {}", msg);
    (StatusCode::FORBIDDEN, msg)
}

fn not_found(what: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

/// The note was not saved; say which step failed without leaking backend detail.
fn note_store_error(e: NoteStoreError) -> ApiError {
    tracing::error!("Note operation failed: {}", e);
    let msg = match e {
        NoteStoreError::Persist(_) | NoteStoreError::Encode(_) => "Failed to save note",
        NoteStoreError::Schedule { .. } => "Failed to schedule reminder",
        NoteStoreError::Cancel { .. } => "Failed to cancel reminder",
    };
    (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string())
}

fn todo_error(e: TodoError) -> ApiError {
    match e {
        TodoError::EmptyText => bad_request(e),
        other => internal_error(other),
    }
}

fn file_error(e: FileLibraryError) -> ApiError {
    match e {
        FileLibraryError::SourceMissing(_) => bad_request(e),
        other => internal_error(other),
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Notes
// ============================================================

#[derive(Debug, Serialize)]
pub struct UpsertNoteResponse {
    #[serde(flatten)]
    pub outcome: UpsertOutcome,
    pub warning: Option<String>,
}

pub async fn list_notes(State(state): State<AppState>) -> Json<Vec<NoteRecord>> {
    let notes = state.notes.lock().expect("note store lock poisoned");
    Json(notes.records())
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(date_key): Path<DateKey>,
) -> Result<Json<NoteRecord>, ApiError> {
    let notes = state.notes.lock().expect("note store lock poisoned");
    notes.get(&date_key).map(Json).ok_or_else(|| not_found("Note"))
}

pub async fn upsert_note(
    State(state): State<AppState>,
    Path(date_key): Path<DateKey>,
    Json(input): Json<UpsertNoteInput>,
) -> Result<Json<UpsertNoteResponse>, ApiError> {
    let mut notes = state.notes.lock().expect("note store lock poisoned");
    let outcome = notes
        .upsert(date_key, &input.note, input.has_notification)
        .map_err(note_store_error)?;
    let warning = outcome.warning();
    Ok(Json(UpsertNoteResponse { outcome, warning }))
}

/// Deleting a day without a note is a no-op, so this always answers 204.
pub async fn delete_note(
    State(state): State<AppState>,
    Path(date_key): Path<DateKey>,
) -> Result<StatusCode, ApiError> {
    let mut notes = state.notes.lock().expect("note store lock poisoned");
    notes.delete(&date_key).map_err(note_store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Calendar
// ============================================================

/// Query parameters for the month grid.
#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    /// Highlighted day; defaults to today.
    pub selected: Option<DateKey>,
}

pub async fn get_month(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthView>, ApiError> {
    let month = YearMonth::new(year, month)
        .ok_or_else(|| bad_request(format!("invalid month {}-{}", year, month)))?;
    let today = state.clock.today();
    let selected = query.selected.map(|key| key.date()).unwrap_or(today);

    let notes = state
        .notes
        .lock()
        .expect("note store lock poisoned")
        .notes()
        .clone();
    Ok(Json(build_month_view(
        month,
        selected,
        today,
        &notes,
        state.lunar.as_ref(),
    )))
}

pub async fn get_lunar(
    State(state): State<AppState>,
    Path(date_key): Path<DateKey>,
) -> Result<Json<LunarInfo>, ApiError> {
    state
        .lunar
        .to_lunar(date_key.date())
        .map(|date| Json(LunarInfo::from(date)))
        .map_err(bad_request)
}

// ============================================================
// Todos
// ============================================================

#[derive(Debug, Serialize)]
pub struct TodoListResponse {
    pub items: Vec<TodoItem>,
    pub stats: TodoStats,
}

pub async fn list_todos(State(state): State<AppState>) -> Json<TodoListResponse> {
    let todos = state.todos.lock().expect("todo list lock poisoned");
    Json(TodoListResponse {
        items: todos.items().to_vec(),
        stats: todos.stats(),
    })
}

pub async fn create_todo(
    State(state): State<AppState>,
    Json(input): Json<CreateTodoInput>,
) -> Result<(StatusCode, Json<TodoItem>), ApiError> {
    let mut todos = state.todos.lock().expect("todo list lock poisoned");
    todos
        .add(&input.text)
        .map(|item| (StatusCode::CREATED, Json(item)))
        .map_err(todo_error)
}

pub async fn toggle_todo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TodoItem>, ApiError> {
    let mut todos = state.todos.lock().expect("todo list lock poisoned");
    todos
        .toggle(id)
        .map_err(todo_error)?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut todos = state.todos.lock().expect("todo list lock poisoned");
    if todos.delete(id).map_err(todo_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Task"))
    }
}

// ============================================================
// Files
// ============================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInfoResponse {
    pub kind: LibraryKind,
    #[serde(flatten)]
    pub directory: DirectoryInfo,
    pub total_size: u64,
    pub total_size_label: String,
}

#[derive(Debug, Serialize)]
pub struct ClearFilesResponse {
    pub removed: usize,
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(kind): Path<LibraryKind>,
) -> Json<Vec<StoredFile>> {
    let files = state.files.lock().expect("file library lock poisoned");
    Json(files.library(kind).files().to_vec())
}

pub async fn import_file(
    State(state): State<AppState>,
    Path(kind): Path<LibraryKind>,
    Json(mut input): Json<ImportFileInput>,
) -> Result<(StatusCode, Json<StoredFile>), ApiError> {
    let source = import_source(state.import_root.as_deref(), &input.source_path)?;
    input.source_path = source.display().to_string();

    let mut files = state.files.lock().expect("file library lock poisoned");
    files
        .library_mut(kind)
        .import(input)
        .map(|file| (StatusCode::CREATED, Json(file)))
        .map_err(file_error)
}

/// Resolve `source_path` and require it to sit under the import root.
/// Paths outside the root are refused whether or not they exist.
fn import_source(root: Option<&std::path::Path>, source_path: &str) -> Result<PathBuf, ApiError> {
    let root = root.ok_or_else(|| forbidden("file import is disabled".to_string()))?;
    let outside = || {
        forbidden(format!(
            "source file {} is outside the import directory",
            source_path
        ))
    };

    let requested = std::path::Path::new(source_path);
    let source = match requested.canonicalize() {
        Ok(source) => source,
        Err(_) if !parent_under(requested, root) => return Err(outside()),
        Err(e) => return Err(bad_request(format!("source file {}: {}", source_path, e))),
    };
    if !source.starts_with(root) {
        return Err(outside());
    }
    Ok(source)
}

/// Whether a path that does not resolve names a file in a directory under `root`.
fn parent_under(path: &std::path::Path, root: &std::path::Path) -> bool {
    matches!(
        path.components().next_back(),
        Some(std::path::Component::Normal(_))
    ) && path
        .parent()
        .and_then(|parent| parent.canonicalize().ok())
        .is_some_and(|parent| parent.starts_with(root))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path((kind, id)): Path<(LibraryKind, String)>,
) -> Result<Json<StoredFile>, ApiError> {
    let files = state.files.lock().expect("file library lock poisoned");
    files
        .library(kind)
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("File"))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((kind, id)): Path<(LibraryKind, String)>,
) -> Result<StatusCode, ApiError> {
    let mut files = state.files.lock().expect("file library lock poisoned");
    if files.library_mut(kind).delete(&id).map_err(file_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("File"))
    }
}

pub async fn clear_files(
    State(state): State<AppState>,
    Path(kind): Path<LibraryKind>,
) -> Result<Json<ClearFilesResponse>, ApiError> {
    let mut files = state.files.lock().expect("file library lock poisoned");
    let removed = files.library_mut(kind).clear().map_err(file_error)?;
    Ok(Json(ClearFilesResponse { removed }))
}

pub async fn get_library_info(
    State(state): State<AppState>,
    Path(kind): Path<LibraryKind>,
) -> Json<LibraryInfoResponse> {
    let files = state.files.lock().expect("file library lock poisoned");
    let library = files.library(kind);
    let total_size = library.total_size();
    Json(LibraryInfoResponse {
        kind,
        directory: library.directory_info(),
        total_size,
        total_size_label: format_file_size(total_size),
    })
}

// ============================================================
// Reminders
// ============================================================

pub async fn list_pending_reminders(
    State(state): State<AppState>,
) -> Result<Json<Vec<Trigger>>, ApiError> {
    state.notifier.pending().map(Json).map_err(internal_error)
}

pub async fn deliver_due_reminders(
    State(state): State<AppState>,
) -> Result<Json<Vec<Trigger>>, ApiError> {
    state.notifier.deliver_due().map(Json).map_err(internal_error)
}
