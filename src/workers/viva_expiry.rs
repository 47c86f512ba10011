use chrono::Utc;

use crate::store::operations::viva_sessions::VivaStatus;
use crate::store::Store;

/// Sweep active viva sessions and abandon those idle past the timeout.
/// Sessions are also lazily expired on touch; this sweep catches the ones
/// nobody comes back for.
pub async fn run(store: &Store, timeout_secs: i64) {
    let sessions = match store.list_active_viva_sessions() {
        Ok(sessions) => sessions,
        Err(e) => {
            tracing::error!(error = %e, "Viva expiry sweep failed to list sessions");
            return;
        }
    };

    let now = Utc::now();
    let mut abandoned = 0usize;
    for mut session in sessions {
        if !session.is_expired(timeout_secs, now) {
            continue;
        }
        session.status = VivaStatus::Abandoned;
        session.updated_at = now;
        match store.update_viva_session(&session) {
            Ok(()) => abandoned += 1,
            Err(e) => {
                tracing::warn!(error = %e, session_id = %session.session_id, "Failed to abandon expired viva session")
            }
        }
    }

    if abandoned > 0 {
        tracing::info!(abandoned, "Abandoned expired viva sessions");
    }
}
