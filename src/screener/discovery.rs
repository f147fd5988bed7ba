// DANS : src/screener/discovery.rs

use crate::decoders::raydium::cpmm::{
    decode_pool, DecodedCpmmPool, CPMM_POOL_PROGRAM_ID, CPMM_POOL_STATE_SIZE,
};
use crate::rpc::{LedgerTransport, ProgramSubscription, Scheduler};
use crate::state::{Observed, StreamError, StreamEvent};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Le flux de découverte : un seul abonnement programme, filtré par la
/// taille exacte d'un compte PoolState, qui couvre tous les pools du
/// programme CPMM. Chaque notification est décodée en place.
pub struct PoolDiscovery {
    subscription: ProgramSubscription,
    done: bool,
}

impl PoolDiscovery {
    /// Ouvre l'abonnement programme, via la porte d'admission.
    pub async fn open(
        transport: &Arc<dyn LedgerTransport>,
        scheduler: &Scheduler,
    ) -> Result<Self> {
        let subscription = scheduler
            .schedule(transport.subscribe_program_accounts(
                &CPMM_POOL_PROGRAM_ID,
                CPMM_POOL_STATE_SIZE as u64,
            ))
            .await
            .context("Échec de l'abonnement au programme CPMM")?;

        Ok(Self {
            subscription,
            done: false,
        })
    }

    /// Prochain pool observé (créé ou mis à jour). Un échec de décodage est
    /// terminal : un compte de la bonne taille qui ne se décode pas signale
    /// un changement de version du programme, pas un incident passager.
    pub async fn recv(&mut self) -> Option<StreamEvent<DecodedCpmmPool>> {
        if self.done {
            return None;
        }
        match self.subscription.updates.recv().await {
            None => {
                self.done = true;
                Some(Err(StreamError::Transport(
                    "le flux de découverte s'est terminé".to_string(),
                )))
            }
            Some(Observed {
                slot,
                value: (address, raw),
            }) => match decode_pool(&address, &raw.data) {
                Ok(pool) => Some(Ok(Observed { slot, value: pool })),
                Err(error) => {
                    self.done = true;
                    Some(Err(StreamError::Decode {
                        address,
                        reason: format!("{error:#}"),
                    }))
                }
            },
        }
    }
}
