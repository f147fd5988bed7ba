// DANS : src/screener/lifecycle.rs
//
// Le cycle de vie d'un pool suivi : détecté à la découverte, armé tant que
// l'ouverture approche, ouvert au passage de l'heure d'ouverture, retiré à
// la fin de la fenêtre d'observation. Entre l'armement et le retrait,
// chaque instantané complet est converti en mise à jour de burn.

use crate::decoders::raydium::cpmm::DecodedCpmmPool;
use crate::math::TokenAmount;
use crate::state::pool_view::{PoolSnapshot, PoolViews};
use crate::state::StreamError;
use fixed::types::I80F48;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

/// On ne suit que les pools qui ouvrent dans les 5 prochaines minutes.
pub const OPEN_TIME_HORIZON: Duration = Duration::from_secs(5 * 60);

/// La fenêtre d'observation d'un pool après son ouverture.
pub const OBSERVATION_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Pourquoi une découverte n'entre pas en suivi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Déjà dans l'ensemble des pools observés.
    AlreadyObserved,
    /// L'heure d'ouverture est déjà passée.
    AlreadyOpen,
    /// L'ouverture est au-delà de l'horizon de 5 minutes.
    OpensTooFarAhead,
}

/// Le filtre d'admission de l'état "détecté". Appelé sur l'unique fil du
/// contrôleur, avec l'ensemble observé qu'il est seul à muter.
pub fn admission_check(
    pool: &DecodedCpmmPool,
    now_unix_secs: u64,
    observed: &HashSet<Pubkey>,
) -> Result<(), Rejection> {
    if observed.contains(&pool.address) {
        return Err(Rejection::AlreadyObserved);
    }
    if pool.open_time <= now_unix_secs {
        return Err(Rejection::AlreadyOpen);
    }
    if pool.open_time - now_unix_secs >= OPEN_TIME_HORIZON.as_secs() {
        return Err(Rejection::OpensTooFarAhead);
    }
    Ok(())
}

/// La mise à jour visible de l'extérieur : combien de LP a été brûlé depuis
/// la création du pool, et quelle fraction de l'offre initiale cela
/// représente. Jamais mutée après création, seulement ajoutée.
#[derive(Debug, Clone)]
pub struct BurnUpdate {
    pub pool: Pubkey,
    pub lp_burned: TokenAmount,
    pub lp_burned_percentage: TokenAmount,
    pub timestamp_ms: u64,
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Convertit l'heure d'ouverture on-chain en échéances sur l'horloge tokio.
fn timer_deadlines(open_time: u64) -> (Instant, Instant) {
    let until_open = Duration::from_secs(open_time.saturating_sub(unix_now_secs()));
    let now = Instant::now();
    (now + until_open, now + until_open + OBSERVATION_WINDOW)
}

/// Dérive la mise à jour de burn d'un instantané complet.
/// `lp_supply` du pool est l'offre mintée à la création ; tout ce qui
/// manque à l'offre courante du mint LP a été brûlé.
pub fn derive_burn(snapshot: &PoolSnapshot) -> Option<BurnUpdate> {
    let pool = snapshot.pool.existing()?;
    let lp_mint = snapshot.lp_mint.as_ref()?.existing()?;

    let initial = TokenAmount::from_base(pool.lp_supply, pool.lp_decimals);
    let current = TokenAmount::from_base(lp_mint.supply, pool.lp_decimals);
    let burned = initial.checked_sub(&current)?;
    // Une offre initiale nulle ne produit rien : le ratio n'a pas de sens.
    let percentage = burned.checked_div(&initial)?;

    Some(BurnUpdate {
        pool: pool.address,
        lp_burned: burned,
        lp_burned_percentage: percentage,
        timestamp_ms: unix_now_ms(),
    })
}

/// La tâche de suivi d'un pool admis. Elle possède la vue composite : son
/// retour (retrait, erreur, arrêt) lâche la vue et libère en cascade tous
/// les abonnements sous-jacents.
pub(crate) async fn track_pool(
    pool: DecodedCpmmPool,
    views: Arc<PoolViews>,
    updates: mpsc::Sender<BurnUpdate>,
    retired: mpsc::Sender<Pubkey>,
) {
    let address = pool.address;
    let mut view = views.subscribe(address);

    // Les minuteries sont armées dès la découverte : l'heure d'ouverture est
    // déjà connue. Elles seront réarmées si elle change avant l'ouverture.
    let mut open_time = pool.open_time;
    let (open_at, retire_at) = timer_deadlines(open_time);
    let mut open_sleep = Box::pin(sleep_until(open_at));
    let mut retire_sleep = Box::pin(sleep_until(retire_at));
    let mut open_fired = false;
    let mut last_burned: Option<I80F48> = None;

    loop {
        tokio::select! {
            () = open_sleep.as_mut(), if !open_fired => {
                open_fired = true;
                info!(pool = %address, "🚀 pool ouvert au trading");
            }
            () = retire_sleep.as_mut() => {
                info!(pool = %address, "💤 fenêtre d'observation terminée, pool retiré");
                break;
            }
            event = view.recv() => match event {
                None => {
                    warn!(pool = %address, "vue composite terminée, pool retiré");
                    break;
                }
                Some(Err(StreamError::Transport(reason))) => {
                    warn!(pool = %address, %reason, "échec transport sur la vue composite, pool retiré");
                    break;
                }
                Some(Err(StreamError::Decode { address: account, reason })) => {
                    error!(
                        pool = %address,
                        account = %account,
                        %reason,
                        "compte indécodable dans la vue composite (version de layout ?), pool retiré"
                    );
                    break;
                }
                Some(Ok(observed)) => {
                    let snapshot = observed.value;

                    if let Some(current) = snapshot.pool.existing() {
                        // Réarmement : seulement sur un vrai changement de
                        // l'heure d'ouverture, et seulement avant l'ouverture.
                        if !open_fired && current.open_time != open_time {
                            open_time = current.open_time;
                            let (open_at, retire_at) = timer_deadlines(open_time);
                            open_sleep.as_mut().reset(open_at);
                            retire_sleep.as_mut().reset(retire_at);
                            info!(pool = %address, open_time, "heure d'ouverture modifiée, minuteries réarmées");
                        }
                    }

                    if let Some(update) = derive_burn(&snapshot) {
                        // N'émettre que si le montant brûlé a changé depuis
                        // la dernière émission pour ce pool.
                        if last_burned != Some(update.lp_burned.base) {
                            last_burned = Some(update.lp_burned.base);
                            if updates.send(update).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    let _ = retired.send(address).await;
    // La vue est lâchée ici : le démontage se propage jusqu'au transport.
}
