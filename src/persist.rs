// DANS : src/persist.rs
//
// La persistance des mises à jour de burn : une liste par pool, en ajout
// seul, dans un fichier JSON. Le volume est celui d'une fenêtre
// d'observation de 10 minutes par pool : la relecture complète à chaque
// ajout reste bon marché.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedUpdate {
    pub lp_burned: String,
    pub lp_burned_percentage: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPool {
    pub pool: String,
    pub updates: Vec<PersistedUpdate>,
}

/// Filtre de lecture : un pool est retenu si l'une de ses mises à jour
/// tombe dans la plage de pourcentage (échelle 0..1).
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateFilter {
    pub min_percentage: Option<f64>,
    pub max_percentage: Option<f64>,
}

impl UpdateFilter {
    fn matches(&self, percentage: f64) -> bool {
        self.min_percentage.is_none_or(|min| percentage >= min)
            && self.max_percentage.is_none_or(|max| percentage <= max)
    }
}

pub struct PoolUpdateStore {
    path: PathBuf,
    // Sérialise les cycles lecture-modification-écriture du fichier.
    guard: Mutex<()>,
}

impl PoolUpdateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Ajoute une mise à jour à la liste du pool, en créant l'entrée au
    /// premier ajout.
    pub async fn append_update(&self, pool: &Pubkey, update: PersistedUpdate) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut pools = self.read_all().await?;

        let key = pool.to_string();
        match pools.iter_mut().find(|entry| entry.pool == key) {
            Some(entry) => entry.updates.push(update),
            None => pools.push(PersistedPool {
                pool: key,
                updates: vec![update],
            }),
        }

        let json = serde_json::to_vec(&pools).context("Échec de la sérialisation des pools en JSON")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Échec de l'écriture de {}", self.path.display()))?;
        Ok(())
    }

    /// Retourne les pools dont au moins une mise à jour passe le filtre,
    /// avec leur liste complète de mises à jour.
    pub async fn list_updates(&self, filter: UpdateFilter) -> Result<Vec<PersistedPool>> {
        let _guard = self.guard.lock().await;
        let pools = self.read_all().await?;
        Ok(pools
            .into_iter()
            .filter(|entry| {
                entry.updates.iter().any(|update| {
                    update
                        .lp_burned_percentage
                        .parse::<f64>()
                        .map(|percentage| filter.matches(percentage))
                        .unwrap_or(false)
                })
            })
            .collect())
    }

    async fn read_all(&self) -> Result<Vec<PersistedPool>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Fichier de pools corrompu : {}", self.path.display())),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => {
                Err(error).with_context(|| format!("Échec de la lecture de {}", self.path.display()))
            }
        }
    }
}
