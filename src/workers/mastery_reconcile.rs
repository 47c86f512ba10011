use crate::orchestrator::TutorEngine;

/// Push locally-authoritative BKT values back to the remote mastery
/// service and adopt its canonical answers (last-writer-wins, remote owns
/// the value).
pub async fn run(engine: &TutorEngine) {
    let reconciled = engine.reconcile_dirty_mastery().await;
    if reconciled > 0 {
        tracing::info!(reconciled, "Reconciled local mastery values with remote service");
    }
}
