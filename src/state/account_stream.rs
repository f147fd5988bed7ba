// DANS : src/state/account_stream.rs
//
// Le flux brut par compte : une lecture ponctuelle d'amorçage fusionnée
// avec un abonnement continu, partagée entre tous les consommateurs de la
// même adresse.

use crate::rpc::{AccountUpdate, LedgerTransport, RawAccount, Scheduler};
use crate::state::multicast::{FeedRegistry, MulticastFeed, MulticastStream};
use crate::state::{StreamError, StreamEvent};
use solana_sdk::pubkey::Pubkey;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CHANNEL_CAPACITY: usize = 64;

pub type AccountStream = MulticastStream<Option<RawAccount>>;
type RawEvent = StreamEvent<Option<RawAccount>>;
type RawFeed = MulticastFeed<Option<RawAccount>>;

/// Le registre des flux de comptes. Une adresse = un abonnement transport et
/// une lecture d'amorçage, quel que soit le nombre de consommateurs.
pub struct AccountStreams {
    transport: Arc<dyn LedgerTransport>,
    scheduler: Arc<Scheduler>,
    registry: FeedRegistry<Option<RawAccount>>,
}

impl AccountStreams {
    pub fn new(transport: Arc<dyn LedgerTransport>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            transport,
            scheduler,
            registry: FeedRegistry::new(),
        }
    }

    /// S'abonne au flux de cette adresse. Le flux sous-jacent est créé
    /// paresseusement au premier abonné et démonté avec le dernier.
    pub fn subscribe(&self, address: Pubkey) -> AccountStream {
        let transport = self.transport.clone();
        let scheduler = self.scheduler.clone();
        self.registry.subscribe_with(address, move || {
            MulticastFeed::open(address, FEED_CHANNEL_CAPACITY, move |tx, weak| {
                drive_account_feed(address, transport, scheduler, tx, weak)
            })
        })
    }
}

async fn drive_account_feed(
    address: Pubkey,
    transport: Arc<dyn LedgerTransport>,
    scheduler: Arc<Scheduler>,
    tx: broadcast::Sender<RawEvent>,
    weak: Weak<RawFeed>,
) {
    // Étape 1 : établir l'abonnement continu, via la porte d'admission.
    // L'ordre compte : l'abonnement d'abord, l'amorçage ensuite, la porte
    // FIFO sérialise naturellement les deux.
    let subscription = scheduler
        .schedule(transport.subscribe_account(&address))
        .await;
    let mut subscription = match subscription {
        Ok(subscription) => subscription,
        Err(error) => {
            MulticastFeed::fail(&weak, &tx, StreamError::Transport(format!("{error:#}")));
            return;
        }
    };

    // Étape 2 : lancer la lecture d'amorçage, en course contre la première
    // notification. Si l'abonnement émet avant que la lecture ne résolve, la
    // lecture est abandonnée : son instantané serait plus vieux que ce que le
    // flux vient de livrer.
    //
    // Il reste une fenêtre étroite entre la résolution de l'amorçage et la
    // première notification pendant laquelle un changement on-chain peut
    // passer inaperçu ; les consommateurs re-dérivent à la notification
    // suivante, la convergence n'est exigée qu'à terme.
    let bootstrap_future = {
        let transport = transport.clone();
        let scheduler = scheduler.clone();
        async move { scheduler.schedule(transport.fetch_account(&address)).await }
    };
    let mut bootstrap: Option<Pin<Box<dyn Future<Output = anyhow::Result<AccountUpdate>> + Send>>> =
        Some(Box::pin(bootstrap_future));

    loop {
        tokio::select! {
            update = subscription.updates.recv() => match update {
                Some(update) => {
                    if bootstrap.take().is_some() {
                        debug!(address = %address, "amorçage abandonné, l'abonnement a émis en premier");
                    }
                    let _ = tx.send(Ok(update));
                }
                None => {
                    MulticastFeed::fail(
                        &weak,
                        &tx,
                        StreamError::Transport("le flux d'abonnement distant s'est terminé".to_string()),
                    );
                    return;
                }
            },
            result = async { bootstrap.as_mut().unwrap().await }, if bootstrap.is_some() => {
                bootstrap = None;
                match result {
                    Ok(update) => {
                        let _ = tx.send(Ok(update));
                    }
                    Err(error) => {
                        MulticastFeed::fail(&weak, &tx, StreamError::Transport(format!("{error:#}")));
                        return;
                    }
                }
            }
        }
    }
}
