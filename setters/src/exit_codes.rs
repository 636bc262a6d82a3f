//! Stable exit codes for setters CLI commands.

/// Command succeeded. Recursive runs also exit with this code when some
/// packages failed; their errors are printed per package.
pub const OK: i32 = 0;
/// Command failed (validation, conflict, parse, I/O, revert failure).
pub const FAILED: i32 = 1;
/// The schema file or the named setter does not exist.
pub const NOT_FOUND: i32 = 3;
