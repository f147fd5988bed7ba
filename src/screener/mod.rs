// DANS : src/screener/mod.rs
//
// Le coordinateur : il possède l'ensemble des pools observés et le toggle
// marche/arrêt de toute la chaîne découverte -> suivi -> persistance.

pub mod discovery;
pub mod lifecycle;

pub use lifecycle::BurnUpdate;

use crate::persist::{PersistedUpdate, PoolUpdateStore};
use crate::rpc::{LedgerTransport, Scheduler};
use crate::state::pool_view::PoolViews;
use crate::state::StreamError;
use anyhow::Result;
use discovery::PoolDiscovery;
use lifecycle::{admission_check, track_pool, unix_now_secs};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const UPDATE_CHANNEL_CAPACITY: usize = 64;
const BROADCAST_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

struct RunningScreener {
    shutdown: oneshot::Sender<()>,
    controller: JoinHandle<()>,
}

/// Le screener. `start` et `stop` sont idempotents ; l'ensemble des pools
/// observés n'est muté que par la tâche contrôleur, les lecteurs n'en
/// voient qu'un miroir en lecture seule.
pub struct Screener {
    transport: Arc<dyn LedgerTransport>,
    scheduler: Arc<Scheduler>,
    views: Arc<PoolViews>,
    store: Arc<PoolUpdateStore>,
    observed: Arc<RwLock<HashSet<Pubkey>>>,
    updates_tx: broadcast::Sender<BurnUpdate>,
    running: Mutex<Option<RunningScreener>>,
}

impl Screener {
    pub fn new(
        transport: Arc<dyn LedgerTransport>,
        scheduler: Arc<Scheduler>,
        views: Arc<PoolViews>,
        store: Arc<PoolUpdateStore>,
    ) -> Self {
        let (updates_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Self {
            transport,
            scheduler,
            views,
            store,
            observed: Arc::new(RwLock::new(HashSet::new())),
            updates_tx,
            running: Mutex::new(None),
        }
    }

    /// Démarre la chaîne. Sans effet si elle tourne déjà.
    pub async fn start(&self) -> Result<StartOutcome> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.controller.is_finished() {
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        // L'abonnement de découverte est établi avant de déclarer le
        // screener actif : un échec ici est un échec de démarrage.
        let discovery = PoolDiscovery::open(&self.transport, &self.scheduler).await?;
        info!("🔎 scan de la chaîne à la recherche de nouveaux pools CPMM");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let context = ControllerContext {
            views: self.views.clone(),
            store: self.store.clone(),
            observed: self.observed.clone(),
            updates_tx: self.updates_tx.clone(),
        };
        let controller = tokio::spawn(run_controller(context, discovery, shutdown_rx));
        *running = Some(RunningScreener {
            shutdown: shutdown_tx,
            controller,
        });
        Ok(StartOutcome::Started)
    }

    /// Arrête la chaîne et attend la fin du contrôleur. Sans effet si déjà
    /// arrêtée.
    pub async fn stop(&self) -> StopOutcome {
        let mut running = self.running.lock().await;
        match running.take() {
            None => StopOutcome::AlreadyStopped,
            Some(current) => {
                if current.controller.is_finished() {
                    return StopOutcome::AlreadyStopped;
                }
                let _ = current.shutdown.send(());
                let _ = current.controller.await;
                StopOutcome::Stopped
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| !current.controller.is_finished())
    }

    /// Le pool est-il actuellement sous suivi de cycle de vie ?
    pub fn is_tracking(&self, address: &Pubkey) -> bool {
        self.observed.read().unwrap().contains(address)
    }

    /// Le flux externe des mises à jour de burn.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<BurnUpdate> {
        self.updates_tx.subscribe()
    }
}

struct ControllerContext {
    views: Arc<PoolViews>,
    store: Arc<PoolUpdateStore>,
    observed: Arc<RwLock<HashSet<Pubkey>>>,
    updates_tx: broadcast::Sender<BurnUpdate>,
}

/// La tâche contrôleur : l'unique fil d'exécution qui mute l'ensemble
/// observé et la table des trackers. Admission et retrait s'y déroulent
/// chacun dans un seul pas de traitement d'événement.
async fn run_controller(
    context: ControllerContext,
    mut discovery: PoolDiscovery,
    mut shutdown: oneshot::Receiver<()>,
) {
    let (updates_tx, mut updates_rx) = mpsc::channel::<BurnUpdate>(UPDATE_CHANNEL_CAPACITY);
    let (retired_tx, mut retired_rx) = mpsc::channel::<Pubkey>(UPDATE_CHANNEL_CAPACITY);
    let mut trackers: HashMap<Pubkey, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            event = discovery.recv() => match event {
                None => break,
                Some(Err(StreamError::Transport(reason))) => {
                    error!(%reason, "le flux de découverte a échoué, arrêt de la chaîne");
                    break;
                }
                Some(Err(StreamError::Decode { address, reason })) => {
                    error!(
                        account = %address,
                        %reason,
                        "pool indécodable dans la découverte (version de layout ?), arrêt de la chaîne"
                    );
                    break;
                }
                Some(Ok(observed)) => {
                    let pool = observed.value;
                    let verdict = {
                        let observed_set = context.observed.read().unwrap();
                        admission_check(&pool, unix_now_secs(), &observed_set)
                    };
                    match verdict {
                        Err(reason) => {
                            debug!(pool = %pool.address, ?reason, "découverte ignorée");
                        }
                        Ok(()) => {
                            info!(pool = %pool.address, open_time = pool.open_time, "🔎 pool détecté");
                            let address = pool.address;
                            context.observed.write().unwrap().insert(address);
                            let tracker = tokio::spawn(track_pool(
                                pool,
                                context.views.clone(),
                                updates_tx.clone(),
                                retired_tx.clone(),
                            ));
                            trackers.insert(address, tracker);
                        }
                    }
                }
            },

            Some(address) = retired_rx.recv() => {
                context.observed.write().unwrap().remove(&address);
                trackers.remove(&address);
            },

            Some(update) = updates_rx.recv() => {
                info!(
                    pool = %update.pool,
                    lp_burned = %update.lp_burned.display,
                    percentage = %update.lp_burned_percentage.display,
                    "📝 variation du burn LP"
                );
                let persisted = PersistedUpdate {
                    lp_burned: update.lp_burned.display.to_string(),
                    lp_burned_percentage: update.lp_burned_percentage.display.to_string(),
                    timestamp: update.timestamp_ms,
                };
                if let Err(persist_error) = context.store.append_update(&update.pool, persisted).await {
                    error!(error = ?persist_error, pool = %update.pool, "échec de persistance de la mise à jour");
                }
                let _ = context.updates_tx.send(update);
            },
        }
    }

    // Arrêt de la chaîne : on annule chaque tracker, ce qui lâche sa vue
    // composite et libère ses abonnements, puis on vide le miroir.
    for (address, tracker) in trackers.drain() {
        tracker.abort();
        context.observed.write().unwrap().remove(&address);
    }
    warn!("chaîne de screening arrêtée");
}
