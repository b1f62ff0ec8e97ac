//! Bulk carrier resolution over the promoted registry tables.
//!
//! Given a batch of terminal numbers and a reference date, answers
//! "which carrier served each number on that date": the most recent
//! completed portability event at or before the date wins, otherwise
//! the numbering-plan designation for the number's range, otherwise
//! the unidentified sentinel.

pub mod dates;
pub mod diagnostics;
pub mod numbers;
pub mod resolver;

pub use diagnostics::{test_connection, ConnectionDiagnostics};
pub use numbers::NumberKey;
pub use resolver::{resolve_carriers, ResolvedNumber, Resolution, RESULT_COLUMNS};
