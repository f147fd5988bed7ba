// DANS : src/rpc/mock.rs
//
// Transport en mémoire pour les tests : un registre de comptes scriptés,
// des canaux de notification vivants et des compteurs d'abonnements. Les
// tests pilotent la chaîne avec `set_account` / `push_program_account` et
// vérifient la libération des ressources via les compteurs.

use crate::rpc::transport::{
    AccountSubscription, AccountUpdate, LedgerTransport, ProgramAccountUpdate,
    ProgramSubscription, RawAccount,
};
use crate::state::{Observed, Slot};
use anyhow::{bail, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

const MOCK_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct MockState {
    accounts: HashMap<Pubkey, (Slot, Option<RawAccount>)>,
    account_subs: HashMap<Pubkey, Vec<mpsc::Sender<AccountUpdate>>>,
    program_subs: Vec<(Pubkey, u64, mpsc::Sender<ProgramAccountUpdate>)>,
    subscribe_counts: HashMap<Pubkey, usize>,
    fetch_counts: HashMap<Pubkey, usize>,
    held_fetches: HashMap<Pubkey, Arc<Notify>>,
    failing_subscribes: HashSet<Pubkey>,
}

#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enregistre l'état courant d'un compte et notifie tous les abonnés vivants.
    pub fn set_account(&self, address: Pubkey, slot: Slot, value: Option<RawAccount>) {
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(address, (slot, value.clone()));
        if let Some(senders) = state.account_subs.get_mut(&address) {
            senders.retain(|sender| !sender.is_closed());
            for sender in senders {
                let _ = sender.try_send(Observed {
                    slot,
                    value: value.clone(),
                });
            }
        }
    }

    /// Pousse une notification de programme vers les abonnements dont le
    /// filtre de taille correspond.
    pub fn push_program_account(
        &self,
        program_id: &Pubkey,
        address: Pubkey,
        slot: Slot,
        account: RawAccount,
    ) {
        let mut state = self.state.lock().unwrap();
        state.program_subs.retain(|(_, _, sender)| !sender.is_closed());
        for (subscribed_program, data_size, sender) in &state.program_subs {
            if subscribed_program == program_id && *data_size == account.data.len() as u64 {
                let _ = sender.try_send(Observed {
                    slot,
                    value: (address, account.clone()),
                });
            }
        }
    }

    /// Retient la prochaine lecture ponctuelle de ce compte jusqu'à l'appel
    /// de `notify_one` sur le `Notify` retourné.
    pub fn hold_fetches(&self, address: Pubkey) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .held_fetches
            .insert(address, gate.clone());
        gate
    }

    /// Fait échouer les prochains abonnements à ce compte.
    pub fn fail_subscribes(&self, address: Pubkey) {
        self.state.lock().unwrap().failing_subscribes.insert(address);
    }

    /// Ferme côté "nœud" tous les abonnements de ce compte (fin de flux).
    pub fn close_account_subscriptions(&self, address: &Pubkey) {
        self.state.lock().unwrap().account_subs.remove(address);
    }

    pub fn subscribe_count(&self, address: &Pubkey) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscribe_counts
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn fetch_count(&self, address: &Pubkey) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetch_counts
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Nombre d'abonnements de compte encore tenus par un consommateur.
    pub fn live_account_subscriptions(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .account_subs
            .values()
            .flatten()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    pub fn live_program_subscriptions(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .program_subs
            .iter()
            .filter(|(_, _, sender)| !sender.is_closed())
            .count()
    }
}

#[async_trait]
impl LedgerTransport for MockLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountUpdate> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            *state.fetch_counts.entry(*address).or_insert(0) += 1;
            state.held_fetches.get(address).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let (slot, value) = self
            .state
            .lock()
            .unwrap()
            .accounts
            .get(address)
            .cloned()
            .unwrap_or((0, None));
        Ok(Observed { slot, value })
    }

    async fn subscribe_account(&self, address: &Pubkey) -> Result<AccountSubscription> {
        let mut state = self.state.lock().unwrap();
        *state.subscribe_counts.entry(*address).or_insert(0) += 1;
        if state.failing_subscribes.contains(address) {
            bail!("abonnement refusé par le transport simulé");
        }
        let (tx, rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
        state.account_subs.entry(*address).or_default().push(tx);
        Ok(AccountSubscription { updates: rx })
    }

    async fn subscribe_program_accounts(
        &self,
        program_id: &Pubkey,
        data_size: u64,
    ) -> Result<ProgramSubscription> {
        let (tx, rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
        self.state
            .lock()
            .unwrap()
            .program_subs
            .push((*program_id, data_size, tx));
        Ok(ProgramSubscription { updates: rx })
    }
}
