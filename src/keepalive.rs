// DANS : src/keepalive.rs
//
// L'hébergeur endort le service au bout d'un quart d'heure d'inactivité :
// on se ping soi-même un peu avant l'échéance pour rester éveillé.

use anyhow::{Context, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(14 * 60);

pub struct KeepAlive {
    base_url: Option<String>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl KeepAlive {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url,
            task: Mutex::new(None),
        }
    }

    /// Démarre le ping périodique. Retourne `false` s'il tournait déjà.
    pub fn enable(&self) -> Result<bool> {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().is_some_and(|current| !current.is_finished()) {
            return Ok(false);
        }

        let url = self
            .base_url
            .clone()
            .context("BASE_URL doit être configurée pour activer le keep-alive")?;

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
            // Le premier tick est immédiat, inutile de se pinger au démarrage.
            interval.tick().await;
            loop {
                interval.tick().await;
                match reqwest::get(&url).await {
                    Ok(response) if response.status().is_success() => {
                        info!("⏰ service réveillé");
                    }
                    Ok(response) => {
                        warn!(status = %response.status(), "⏰ échec du réveil du service");
                    }
                    Err(error) => {
                        warn!(error = %error, "⏰ échec du réveil du service");
                    }
                }
            }
        }));
        Ok(true)
    }

    /// Arrête le ping. Retourne `false` s'il était déjà arrêté.
    pub fn disable(&self) -> bool {
        let mut task = self.task.lock().unwrap();
        match task.take() {
            Some(current) if !current.is_finished() => {
                current.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|current| !current.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enable_et_disable_sont_idempotents() {
        let keepalive = KeepAlive::new(Some("http://localhost:0".to_string()));

        assert!(keepalive.enable().unwrap());
        assert!(!keepalive.enable().unwrap());
        assert!(keepalive.is_active());

        assert!(keepalive.disable());
        assert!(!keepalive.disable());
        assert!(!keepalive.is_active());
    }

    #[tokio::test]
    async fn refuse_de_demarrer_sans_url() {
        let keepalive = KeepAlive::new(None);
        assert!(keepalive.enable().is_err());
        assert!(!keepalive.is_active());
    }
}
