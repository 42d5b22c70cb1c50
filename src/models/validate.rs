//! Input checks shared by the checkpoint and metrics stores.

use super::{LectioError, Result};

/// Session ids become file names, so they must not escape the storage root.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty()
        || session_id.starts_with('.')
        || session_id.contains(['/', '\\', '\0'])
    {
        return Err(LectioError::InvalidInput(format!(
            "unusable session id: {session_id:?}"
        )));
    }
    Ok(())
}

/// JSON has no NaN or infinity, and serde_json writes them as `null`,
/// so persisted floats must be finite.
pub fn ensure_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LectioError::InvalidInput(format!(
            "{field} must be a finite number, got {value}"
        )))
    }
}
