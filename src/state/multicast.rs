// DANS : src/state/multicast.rs
//
// La brique de partage des flux : un canal broadcast piloté par une tâche
// propriétaire, compté par références. Le flux sous-jacent est créé au
// premier abonné et démonté quand le dernier se détache ; une erreur
// terminale est mémorisée pour être servie aux abonnés tardifs.

use crate::state::{StreamError, StreamEvent};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

enum FeedState<T> {
    Live(broadcast::Sender<StreamEvent<T>>),
    Failed(StreamError),
}

/// Un flux partagé : la tâche pilote alimente le canal broadcast, les
/// abonnés tiennent le feed en vie par comptage de références (Arc).
/// Lâcher le dernier abonné annule la tâche pilote, ce qui lâche à son tour
/// les ressources qu'elle possède (abonnements transport, flux enfants).
pub struct MulticastFeed<T> {
    address: Pubkey,
    state: Mutex<FeedState<T>>,
    driver: JoinHandle<()>,
}

impl<T> Drop for MulticastFeed<T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl<T: Clone + Send + 'static> MulticastFeed<T> {
    /// Crée le feed et démarre sa tâche pilote. Le pilote reçoit l'émetteur
    /// broadcast et une référence faible vers le feed pour pouvoir y
    /// enregistrer une erreur terminale.
    pub fn open<D, F>(address: Pubkey, capacity: usize, drive: D) -> Arc<Self>
    where
        D: FnOnce(broadcast::Sender<StreamEvent<T>>, Weak<MulticastFeed<T>>) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new_cyclic(|weak: &Weak<MulticastFeed<T>>| {
            let driver = tokio::spawn(drive(tx.clone(), weak.clone()));
            MulticastFeed {
                address,
                state: Mutex::new(FeedState::Live(tx)),
                driver,
            }
        })
    }

    /// Attache un nouvel abonné. Si le flux a déjà échoué, l'abonné recevra
    /// l'erreur mémorisée puis la fin du flux.
    pub fn attach(self: &Arc<Self>) -> MulticastStream<T> {
        let inner = match &*self.state.lock().unwrap() {
            FeedState::Live(tx) => StreamInner::Live(tx.subscribe()),
            FeedState::Failed(error) => StreamInner::Failed(Some(error.clone())),
        };
        MulticastStream {
            _feed: self.clone(),
            address: self.address,
            inner,
        }
    }

    /// Termine le flux en erreur : les abonnés courants reçoivent l'erreur,
    /// les abonnés futurs la recevront depuis l'état mémorisé. À appeler en
    /// dernier geste du pilote, juste avant son retour.
    pub fn fail(
        weak: &Weak<MulticastFeed<T>>,
        tx: &broadcast::Sender<StreamEvent<T>>,
        error: StreamError,
    ) {
        let _ = tx.send(Err(error.clone()));
        if let Some(feed) = weak.upgrade() {
            // Remplacer Live par Failed lâche l'émetteur stocké : une fois le
            // clone du pilote parti, les récepteurs verront la fermeture.
            *feed.state.lock().unwrap() = FeedState::Failed(error);
        }
    }
}

enum StreamInner<T> {
    Live(broadcast::Receiver<StreamEvent<T>>),
    Failed(Option<StreamError>),
}

/// Le handle d'abonné d'un flux partagé. `recv` rend `None` une fois le
/// flux terminé (après une éventuelle erreur terminale).
pub struct MulticastStream<T> {
    _feed: Arc<MulticastFeed<T>>,
    address: Pubkey,
    inner: StreamInner<T>,
}

impl<T: Clone> MulticastStream<T> {
    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        match &mut self.inner {
            StreamInner::Failed(error) => error.take().map(Err),
            StreamInner::Live(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Un abonné trop lent saute des événements : le flux
                        // converge sur la prochaine observation, on continue.
                        warn!(address = %self.address, missed, "abonné en retard sur le flux, événements sautés");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

/// Registre de feeds par adresse. Il ne tient que des références faibles :
/// c'est l'abonné, pas le registre, qui maintient un feed en vie.
pub struct FeedRegistry<T> {
    feeds: Mutex<HashMap<Pubkey, Weak<MulticastFeed<T>>>>,
}

impl<T: Clone + Send + 'static> FeedRegistry<T> {
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// Rejoint le feed existant de cette adresse, ou le crée via `open`.
    pub fn subscribe_with(
        &self,
        address: Pubkey,
        open: impl FnOnce() -> Arc<MulticastFeed<T>>,
    ) -> MulticastStream<T> {
        let mut feeds = self.feeds.lock().unwrap();
        if let Some(feed) = feeds.get(&address).and_then(Weak::upgrade) {
            return feed.attach();
        }
        // On purge les entrées mortes au passage, le registre ne grossit
        // qu'avec les adresses réellement suivies.
        feeds.retain(|_, weak| weak.strong_count() > 0);
        let feed = open();
        feeds.insert(address, Arc::downgrade(&feed));
        feed.attach()
    }
}

impl<T: Clone + Send + 'static> Default for FeedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
