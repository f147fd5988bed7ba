// DANS : src/rpc/transport.rs

use crate::state::Observed;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use solana_account_decoder::{UiAccount, UiAccountEncoding};
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::RpcFilterType,
};
use solana_sdk::{account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Les octets bruts d'un compte existant, tels que renvoyés par le nœud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccount {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Une observation de compte : `None` signifie que le nœud confirme l'absence.
pub type AccountUpdate = Observed<Option<RawAccount>>;

/// Une notification de compte appartenant à un programme surveillé.
pub type ProgramAccountUpdate = Observed<(Pubkey, RawAccount)>;

/// Un abonnement de compte en cours. Lâcher le récepteur est LE mécanisme
/// de libération : la tâche de pompage le détecte et résilie l'abonnement
/// côté nœud.
pub struct AccountSubscription {
    pub updates: mpsc::Receiver<AccountUpdate>,
}

pub struct ProgramSubscription {
    pub updates: mpsc::Receiver<ProgramAccountUpdate>,
}

/// Le contrat consommé par le moteur : une lecture ponctuelle et deux formes
/// d'abonnement. Les trois opérations passent par le `Scheduler` côté
/// appelant ; le transport ne fait aucune admission lui-même.
#[async_trait]
pub trait LedgerTransport: Send + Sync + 'static {
    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountUpdate>;

    async fn subscribe_account(&self, address: &Pubkey) -> Result<AccountSubscription>;

    async fn subscribe_program_accounts(
        &self,
        program_id: &Pubkey,
        data_size: u64,
    ) -> Result<ProgramSubscription>;
}

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 64;

/// L'implémentation de production : RPC HTTP pour les lectures ponctuelles,
/// une connexion websocket partagée pour tous les abonnements. Les lectures
/// ré-essaient les erreurs réseau temporaires ; la politique de reconnexion
/// s'arrête là, le reste du système traite une fin de flux comme terminale.
pub struct SolanaTransport {
    rpc: Arc<RpcClient>,
    pubsub: Arc<PubsubClient>,
    commitment: CommitmentConfig,
    max_retries: u8,
    retry_delay: Duration,
}

impl SolanaTransport {
    pub async fn connect(rpc_url: &str, ws_url: &str) -> Result<Self> {
        let pubsub = PubsubClient::new(ws_url)
            .await
            .with_context(|| format!("Impossible d'établir la connexion websocket vers {ws_url}"))?;

        Ok(Self {
            rpc: Arc::new(RpcClient::new_with_commitment(
                rpc_url.to_string(),
                CommitmentConfig::confirmed(),
            )),
            pubsub: Arc::new(pubsub),
            commitment: CommitmentConfig::confirmed(),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        })
    }

    /// Détermine si une erreur du client est temporaire et mérite un ré-essai.
    fn is_retryable(error: &ClientError) -> bool {
        matches!(
            error.kind,
            ClientErrorKind::Reqwest(_) | ClientErrorKind::RpcError(_) | ClientErrorKind::Io(_)
        )
    }

    fn account_config(&self) -> RpcAccountInfoConfig {
        RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            data_slice: None,
            commitment: Some(self.commitment),
            min_context_slot: None,
        }
    }
}

fn decode_ui_account(account: UiAccount) -> Option<RawAccount> {
    let account: Account = account.decode()?;
    Some(RawAccount {
        lamports: account.lamports,
        owner: account.owner,
        data: account.data,
    })
}

#[async_trait]
impl LedgerTransport for SolanaTransport {
    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountUpdate> {
        for attempt in 0..=self.max_retries {
            match self
                .rpc
                .get_account_with_commitment(address, self.commitment)
                .await
            {
                Ok(response) => {
                    return Ok(Observed {
                        slot: response.context.slot,
                        value: response.value.map(|account| RawAccount {
                            lamports: account.lamports,
                            owner: account.owner,
                            data: account.data,
                        }),
                    });
                }
                Err(error) => {
                    if Self::is_retryable(&error) && attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    } else {
                        return Err(error).with_context(|| {
                            format!("Échec final de get_account_with_commitment pour {address}")
                        });
                    }
                }
            }
        }
        unreachable!()
    }

    async fn subscribe_account(&self, address: &Pubkey) -> Result<AccountSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let pubsub = self.pubsub.clone();
        let config = self.account_config();
        let address = *address;

        tokio::spawn(async move {
            let subscribed = pubsub.account_subscribe(&address, Some(config)).await;
            let (mut notifications, unsubscribe) = match subscribed {
                Ok(subscription) => {
                    let _ = ready_tx.send(Ok(()));
                    subscription
                }
                Err(error) => {
                    let _ = ready_tx.send(Err(anyhow!(error)
                        .context(format!("Échec de l'abonnement au compte {address}"))));
                    return;
                }
            };

            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(response) => {
                            let Some(raw) = decode_ui_account(response.value) else {
                                warn!(address = %address, "notification de compte avec un encodage inattendu, ignorée");
                                continue;
                            };
                            let update = Observed { slot: response.context.slot, value: Some(raw) };
                            if tx.send(update).await.is_err() {
                                break;
                            }
                        }
                        // Le nœud a fermé le flux : le consommateur verra la fin du canal.
                        None => break,
                    },
                    () = tx.closed() => break,
                }
            }

            drop(notifications);
            unsubscribe().await;
        });

        ready_rx
            .await
            .context("La tâche d'abonnement s'est arrêtée prématurément")??;
        Ok(AccountSubscription { updates: rx })
    }

    async fn subscribe_program_accounts(
        &self,
        program_id: &Pubkey,
        data_size: u64,
    ) -> Result<ProgramSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let pubsub = self.pubsub.clone();
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![RpcFilterType::DataSize(data_size)]),
            account_config: self.account_config(),
            ..RpcProgramAccountsConfig::default()
        };
        let program_id = *program_id;

        tokio::spawn(async move {
            let subscribed = pubsub.program_subscribe(&program_id, Some(config)).await;
            let (mut notifications, unsubscribe) = match subscribed {
                Ok(subscription) => {
                    let _ = ready_tx.send(Ok(()));
                    subscription
                }
                Err(error) => {
                    let _ = ready_tx.send(Err(anyhow!(error)
                        .context(format!("Échec de l'abonnement au programme {program_id}"))));
                    return;
                }
            };

            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(response) => {
                            let keyed = response.value;
                            let Ok(address) = Pubkey::from_str(&keyed.pubkey) else {
                                warn!(pubkey = %keyed.pubkey, "notification de programme avec une adresse invalide, ignorée");
                                continue;
                            };
                            let Some(raw) = decode_ui_account(keyed.account) else {
                                warn!(address = %address, "notification de programme avec un encodage inattendu, ignorée");
                                continue;
                            };
                            let update = Observed { slot: response.context.slot, value: (address, raw) };
                            if tx.send(update).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    () = tx.closed() => break,
                }
            }

            drop(notifications);
            unsubscribe().await;
        });

        ready_rx
            .await
            .context("La tâche d'abonnement s'est arrêtée prématurément")??;
        Ok(ProgramSubscription { updates: rx })
    }
}
