// DANS : src/rpc/scheduler.rs

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Porte d'admission pour toutes les opérations sortantes vers le nœud RPC.
///
/// Deux garanties, et seulement deux :
/// - une seule opération s'exécute à la fois (les appelants passent FIFO),
/// - deux démarrages consécutifs sont espacés d'au moins `min_interval`.
///
/// L'échec d'une opération est rendu à son appelant et n'affecte pas les
/// opérations en attente. Le planificateur est passé explicitement en
/// `Arc<Scheduler>` à chaque composant qui émet des requêtes : pas de
/// singleton caché.
pub struct Scheduler {
    min_interval: Duration,
    // Le Mutex de tokio sert de file FIFO : le garder pendant l'exécution
    // de la tâche sérialise les opérations.
    gate: Mutex<Option<Instant>>,
}

impl Scheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            gate: Mutex::new(None),
        }
    }

    /// Exécute `task` dès que la porte l'autorise et retourne son résultat.
    pub async fn schedule<F: Future>(&self, task: F) -> F::Output {
        let mut last_start = self.gate.lock().await;
        if let Some(last) = *last_start {
            sleep_until(last + self.min_interval).await;
        }
        *last_start = Some(Instant::now());
        // On garde le verrou pendant l'exécution : une seule opération en vol.
        task.await
    }
}
