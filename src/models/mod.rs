//! Domain models.
//!
//! - [`NoteRecord`]: a note attached to one calendar day, keyed by [`DateKey`],
//!   optionally backed by a 07:00 reminder trigger.
//! - [`TodoItem`]: an entry of the task list.
//! - [`StoredFile`]: a file copied into one of the managed libraries
//!   ([`LibraryKind`]).

mod file;
mod note;
mod todo;

pub use file::*;
pub use note::*;
pub use todo::*;
