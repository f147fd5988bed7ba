// DANS : src/state/pool_view.rs
//
// La vue composite d'un pool : la vue décodée du pool, jointe aux vues de
// tous les comptes qu'il référence. Trois mécanismes y cohabitent :
// - bascule : une branche dépendante n'est (ré)ouverte que quand l'adresse
//   qu'elle suit change dans le compte de pool,
// - jonction : un instantané part à chaque événement dès que chaque branche
//   a produit au moins une valeur,
// - passage d'absence : tant que le pool n'existe pas, l'absence traverse
//   immédiatement, sans champs dépendants.

use crate::decoders::metaplex::{decode_metadata, find_metadata_address, DecodedMetadata};
use crate::decoders::raydium::cpmm::{decode_pool, DecodedCpmmPool};
use crate::decoders::spl_token_decoders::{
    decode_account, decode_mint, DecodedMint, DecodedSplAccount,
};
use crate::state::account_stream::AccountStreams;
use crate::state::decoded::DecodedAccountView;
use crate::state::multicast::{FeedRegistry, MulticastFeed, MulticastStream};
use crate::state::{MaybeAccount, Observed, StreamError, StreamEvent};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const VIEW_CHANNEL_CAPACITY: usize = 64;
const BRANCH_CHANNEL_CAPACITY: usize = 64;

/// Les sept comptes dépendants d'un pool. Le compte de pool lui-même est
/// tenu directement par le pilote, il n'est pas une branche.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Branch {
    LpMint,
    MintA,
    MintB,
    VaultA,
    VaultB,
    MintAMeta,
    MintBMeta,
}

const DEPENDENT_BRANCHES: [Branch; 7] = [
    Branch::LpMint,
    Branch::MintA,
    Branch::MintB,
    Branch::VaultA,
    Branch::VaultB,
    Branch::MintAMeta,
    Branch::MintBMeta,
];

/// Valeur uniforme transportée par le canal des branches.
#[derive(Debug, Clone)]
enum BranchAccount {
    Mint(DecodedMint),
    Token(DecodedSplAccount),
    Metadata(DecodedMetadata),
}

impl BranchAccount {
    fn into_mint(self) -> Option<DecodedMint> {
        match self {
            BranchAccount::Mint(mint) => Some(mint),
            _ => None,
        }
    }

    fn into_token(self) -> Option<DecodedSplAccount> {
        match self {
            BranchAccount::Token(token) => Some(token),
            _ => None,
        }
    }

    fn into_metadata(self) -> Option<DecodedMetadata> {
        match self {
            BranchAccount::Metadata(metadata) => Some(metadata),
            _ => None,
        }
    }
}

type BranchEvent = (Branch, StreamEvent<MaybeAccount<BranchAccount>>);

/// L'instantané composite. Les champs dépendants restent `None` tant que la
/// branche correspondante n'a rien émis ; l'absence du pool les vide tous.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: MaybeAccount<DecodedCpmmPool>,
    pub lp_mint: Option<MaybeAccount<DecodedMint>>,
    pub mint_a: Option<MaybeAccount<DecodedMint>>,
    pub mint_b: Option<MaybeAccount<DecodedMint>>,
    pub vault_a: Option<MaybeAccount<DecodedSplAccount>>,
    pub vault_b: Option<MaybeAccount<DecodedSplAccount>>,
    pub mint_a_meta: Option<MaybeAccount<DecodedMetadata>>,
    pub mint_b_meta: Option<MaybeAccount<DecodedMetadata>>,
}

impl PoolSnapshot {
    /// L'instantané n'autorise une dérivation (burn) que si le pool existe
    /// ET que son mint LP existe.
    pub fn is_complete(&self) -> bool {
        self.pool.exists()
            && matches!(&self.lp_mint, Some(lp_mint) if lp_mint.exists())
    }

    fn absent(pool: MaybeAccount<DecodedCpmmPool>) -> Self {
        Self {
            pool,
            lp_mint: None,
            mint_a: None,
            mint_b: None,
            vault_a: None,
            vault_b: None,
            mint_a_meta: None,
            mint_b_meta: None,
        }
    }
}

pub type PoolViewStream = MulticastStream<PoolSnapshot>;
type SnapshotFeed = MulticastFeed<PoolSnapshot>;

/// Le registre des vues composites, partagées par adresse de pool comme les
/// flux de comptes le sont par adresse de compte.
pub struct PoolViews {
    streams: Arc<AccountStreams>,
    registry: FeedRegistry<PoolSnapshot>,
}

impl PoolViews {
    pub fn new(streams: Arc<AccountStreams>) -> Self {
        Self {
            streams,
            registry: FeedRegistry::new(),
        }
    }

    pub fn subscribe(&self, pool_address: Pubkey) -> PoolViewStream {
        let streams = self.streams.clone();
        self.registry.subscribe_with(pool_address, move || {
            MulticastFeed::open(pool_address, VIEW_CHANNEL_CAPACITY, move |tx, weak| {
                drive_pool_view(pool_address, streams, tx, weak)
            })
        })
    }
}

/// Une branche vivante : l'adresse suivie et la tâche qui pompe sa vue vers
/// le pilote. Lâcher la branche annule la tâche, qui lâche sa vue, qui
/// décrémente le flux de compte partagé.
struct BranchSub {
    address: Pubkey,
    task: JoinHandle<()>,
}

impl Drop for BranchSub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_branch<T: Send + 'static>(
    branch: Branch,
    mut view: DecodedAccountView<T>,
    wrap: fn(T) -> BranchAccount,
    tx: mpsc::Sender<BranchEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = view.recv() => match event {
                    None => break,
                    Some(event) => {
                        let event = event.map(|observed| Observed {
                            slot: observed.slot,
                            value: observed.value.map_data(wrap),
                        });
                        if tx.send((branch, event)).await.is_err() {
                            break;
                        }
                    }
                },
                () = tx.closed() => break,
            }
        }
    })
}

/// (Ré)ouvre les branches dont l'adresse référencée a changé. Les branches
/// dont la référence est stable ne sont pas touchées : la bascule est bornée
/// aux vrais changements de référence.
fn sync_branches(
    pool: &DecodedCpmmPool,
    streams: &Arc<AccountStreams>,
    branch_tx: &mpsc::Sender<BranchEvent>,
    branches: &mut HashMap<Branch, BranchSub>,
) {
    let targets = [
        (Branch::LpMint, pool.lp_mint),
        (Branch::MintA, pool.mint_a),
        (Branch::MintB, pool.mint_b),
        (Branch::VaultA, pool.vault_a),
        (Branch::VaultB, pool.vault_b),
        // Les métadonnées suivent les mints : leur adresse dérive de la
        // référence de mint, pas d'un champ du pool.
        (Branch::MintAMeta, find_metadata_address(&pool.mint_a)),
        (Branch::MintBMeta, find_metadata_address(&pool.mint_b)),
    ];

    for (branch, address) in targets {
        if branches
            .get(&branch)
            .is_some_and(|current| current.address == address)
        {
            continue;
        }

        let task = match branch {
            Branch::LpMint | Branch::MintA | Branch::MintB => spawn_branch(
                branch,
                DecodedAccountView::new(streams.subscribe(address), decode_mint),
                BranchAccount::Mint,
                branch_tx.clone(),
            ),
            Branch::VaultA | Branch::VaultB => spawn_branch(
                branch,
                DecodedAccountView::new(streams.subscribe(address), decode_account),
                BranchAccount::Token,
                branch_tx.clone(),
            ),
            Branch::MintAMeta | Branch::MintBMeta => spawn_branch(
                branch,
                DecodedAccountView::new(streams.subscribe(address), decode_metadata),
                BranchAccount::Metadata,
                branch_tx.clone(),
            ),
        };
        // L'ancienne branche, s'il y en avait une, est annulée par son Drop.
        branches.insert(branch, BranchSub { address, task });
    }
}

fn typed_branch<U>(
    latest: &HashMap<Branch, Observed<MaybeAccount<BranchAccount>>>,
    branch: Branch,
    extract: fn(BranchAccount) -> Option<U>,
) -> Option<MaybeAccount<U>> {
    latest
        .get(&branch)
        .and_then(|observed| observed.value.clone().filter_map_data(extract))
}

fn build_snapshot(
    pool: &MaybeAccount<DecodedCpmmPool>,
    latest: &HashMap<Branch, Observed<MaybeAccount<BranchAccount>>>,
) -> PoolSnapshot {
    match pool {
        MaybeAccount::Absent { .. } => PoolSnapshot::absent(pool.clone()),
        MaybeAccount::Present { .. } => PoolSnapshot {
            pool: pool.clone(),
            lp_mint: typed_branch(latest, Branch::LpMint, BranchAccount::into_mint),
            mint_a: typed_branch(latest, Branch::MintA, BranchAccount::into_mint),
            mint_b: typed_branch(latest, Branch::MintB, BranchAccount::into_mint),
            vault_a: typed_branch(latest, Branch::VaultA, BranchAccount::into_token),
            vault_b: typed_branch(latest, Branch::VaultB, BranchAccount::into_token),
            mint_a_meta: typed_branch(latest, Branch::MintAMeta, BranchAccount::into_metadata),
            mint_b_meta: typed_branch(latest, Branch::MintBMeta, BranchAccount::into_metadata),
        },
    }
}

fn emit_if_ready(
    tx: &broadcast::Sender<StreamEvent<PoolSnapshot>>,
    slot: u64,
    pool_latest: &Observed<MaybeAccount<DecodedCpmmPool>>,
    latest: &HashMap<Branch, Observed<MaybeAccount<BranchAccount>>>,
) {
    let ready = match &pool_latest.value {
        // L'absence traverse sans attendre les branches.
        MaybeAccount::Absent { .. } => true,
        // La jonction n'émet qu'une fois chaque branche renseignée.
        MaybeAccount::Present { .. } => DEPENDENT_BRANCHES
            .iter()
            .all(|branch| latest.contains_key(branch)),
    };
    if !ready {
        return;
    }
    let _ = tx.send(Ok(Observed {
        slot,
        value: build_snapshot(&pool_latest.value, latest),
    }));
}

async fn drive_pool_view(
    pool_address: Pubkey,
    streams: Arc<AccountStreams>,
    tx: broadcast::Sender<StreamEvent<PoolSnapshot>>,
    weak: Weak<SnapshotFeed>,
) {
    let mut pool_view = DecodedAccountView::new(streams.subscribe(pool_address), decode_pool);
    let (branch_tx, mut branch_rx) = mpsc::channel::<BranchEvent>(BRANCH_CHANNEL_CAPACITY);

    let mut branches: HashMap<Branch, BranchSub> = HashMap::new();
    let mut latest: HashMap<Branch, Observed<MaybeAccount<BranchAccount>>> = HashMap::new();
    let mut pool_latest: Option<Observed<MaybeAccount<DecodedCpmmPool>>> = None;

    loop {
        tokio::select! {
            event = pool_view.recv() => match event {
                None => {
                    MulticastFeed::fail(
                        &weak,
                        &tx,
                        StreamError::Transport("la vue du compte de pool s'est terminée".to_string()),
                    );
                    break;
                }
                Some(Err(error)) => {
                    MulticastFeed::fail(&weak, &tx, error);
                    break;
                }
                Some(Ok(observed)) => {
                    let slot = observed.slot;
                    if let MaybeAccount::Present { data: pool, .. } = &observed.value {
                        sync_branches(pool, &streams, &branch_tx, &mut branches);
                    }
                    pool_latest = Some(observed);
                    // La valeur de pool qui a déclenché l'éventail fait
                    // partie de la jonction : on la ré-injecte en tentant
                    // d'émettre tout de suite.
                    emit_if_ready(&tx, slot, pool_latest.as_ref().unwrap(), &latest);
                }
            },
            Some((branch, event)) = branch_rx.recv() => match event {
                Err(error) => {
                    MulticastFeed::fail(&weak, &tx, error);
                    break;
                }
                Ok(observed) => {
                    let slot = observed.slot;
                    // Après une bascule, l'ancienne valeur reste la dernière
                    // connue jusqu'à la première émission du nouveau compte.
                    latest.insert(branch, observed);
                    if let Some(pool_latest) = &pool_latest {
                        emit_if_ready(&tx, slot, pool_latest, &latest);
                    }
                }
            },
        }
    }
    // Le Drop des branches annule leurs tâches, qui lâchent leurs vues.
    drop(branches);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::metaplex::fixtures::metadata_account_bytes;
    use crate::decoders::raydium::cpmm::pool::fixtures::PoolAccountFixture;
    use crate::decoders::spl_token_decoders::account::fixtures::token_account_bytes;
    use crate::decoders::spl_token_decoders::mint::fixtures::mint_account_bytes;
    use crate::rpc::mock::MockLedger;
    use crate::rpc::{RawAccount, Scheduler};
    use std::time::Duration;

    fn raw(data: Vec<u8>) -> RawAccount {
        RawAccount {
            lamports: 1,
            owner: Pubkey::new_unique(),
            data,
        }
    }

    fn views(ledger: &Arc<MockLedger>) -> PoolViews {
        let streams = Arc::new(AccountStreams::new(
            ledger.clone(),
            Arc::new(Scheduler::new(Duration::from_millis(100))),
        ));
        PoolViews::new(streams)
    }

    /// Scripte le pool et ses sept comptes dépendants dans le registre simulé.
    fn script_full_pool(
        ledger: &Arc<MockLedger>,
        pool_address: Pubkey,
        fixture: &PoolAccountFixture,
        lp_supply: u64,
    ) {
        ledger.set_account(pool_address, 1, Some(raw(fixture.bytes())));
        ledger.set_account(fixture.lp_mint, 1, Some(raw(mint_account_bytes(lp_supply, 9))));
        ledger.set_account(fixture.mint_a, 1, Some(raw(mint_account_bytes(500, 9))));
        ledger.set_account(fixture.mint_b, 1, Some(raw(mint_account_bytes(600, 6))));
        ledger.set_account(
            fixture.vault_a,
            1,
            Some(raw(token_account_bytes(&fixture.mint_a, &pool_address, 10))),
        );
        ledger.set_account(
            fixture.vault_b,
            1,
            Some(raw(token_account_bytes(&fixture.mint_b, &pool_address, 20))),
        );
        ledger.set_account(
            find_metadata_address(&fixture.mint_a),
            1,
            Some(raw(metadata_account_bytes(&fixture.mint_a, "Jeton A", "AAA"))),
        );
        ledger.set_account(
            find_metadata_address(&fixture.mint_b),
            1,
            Some(raw(metadata_account_bytes(&fixture.mint_b, "Jeton B", "BBB"))),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn l_absence_traverse_sans_champs_dependants() {
        let ledger = MockLedger::new();
        let pool_address = Pubkey::new_unique();
        // Aucun compte scripté : le pool est confirmé absent.

        let views = views(&ledger);
        let mut view = views.subscribe(pool_address);

        let snapshot = view.recv().await.unwrap().unwrap().value;
        assert!(!snapshot.pool.exists());
        assert!(snapshot.lp_mint.is_none());
        assert!(snapshot.vault_b.is_none());
        assert!(!snapshot.is_complete());

        // Le pool absent n'a déclenché aucun éventail : seul le compte de
        // pool est suivi.
        assert_eq!(ledger.live_account_subscriptions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn la_jonction_attend_toutes_les_branches() {
        let ledger = MockLedger::new();
        let pool_address = Pubkey::new_unique();
        let fixture = PoolAccountFixture {
            lp_supply: 1_000_000,
            ..PoolAccountFixture::default()
        };
        script_full_pool(&ledger, pool_address, &fixture, 750_000);

        let views = views(&ledger);
        let mut view = views.subscribe(pool_address);

        // Le premier instantané n'arrive qu'une fois les 7 branches amorcées,
        // et il est donc complet d'emblée.
        let snapshot = view.recv().await.unwrap().unwrap().value;
        assert!(snapshot.is_complete());
        let lp_mint = snapshot.lp_mint.unwrap();
        assert_eq!(lp_mint.existing().unwrap().supply, 750_000);
        assert_eq!(
            snapshot.pool.existing().unwrap().lp_supply,
            1_000_000
        );
        assert_eq!(
            snapshot.mint_a_meta.unwrap().existing().unwrap().symbol,
            "AAA"
        );

        // 1 pool + 7 dépendants.
        assert_eq!(ledger.live_account_subscriptions(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn une_bascule_ne_rouvre_que_la_branche_concernee() {
        let ledger = MockLedger::new();
        let pool_address = Pubkey::new_unique();
        let mut fixture = PoolAccountFixture::default();
        script_full_pool(&ledger, pool_address, &fixture, 900);

        let views = views(&ledger);
        let mut view = views.subscribe(pool_address);
        assert!(view.recv().await.unwrap().is_ok());
        assert_eq!(ledger.subscribe_count(&fixture.lp_mint), 1);

        // Le pool re-note avec un nouveau mint LP : seule cette branche bascule.
        let old_lp_mint = fixture.lp_mint;
        let new_lp_mint = Pubkey::new_unique();
        fixture.lp_mint = new_lp_mint;
        ledger.set_account(new_lp_mint, 2, Some(raw(mint_account_bytes(100, 9))));
        ledger.set_account(pool_address, 2, Some(raw(fixture.bytes())));

        // On draine jusqu'à voir la nouvelle offre dans la jonction.
        loop {
            let snapshot = view.recv().await.unwrap().unwrap().value;
            if let Some(lp_mint) = &snapshot.lp_mint {
                if lp_mint.existing().map(|mint| mint.supply) == Some(100) {
                    break;
                }
            }
        }

        assert_eq!(ledger.subscribe_count(&new_lp_mint), 1);
        // Les branches stables n'ont pas été rouvertes.
        assert_eq!(ledger.subscribe_count(&fixture.mint_a), 1);
        assert_eq!(ledger.subscribe_count(&fixture.vault_a), 1);
        // L'ancienne branche a été lâchée.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            ledger
                .subscribe_count(&old_lp_mint),
            1,
            "l'ancien mint n'a été souscrit qu'une fois"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn le_pool_qui_disparait_redevient_une_absence_nue() {
        let ledger = MockLedger::new();
        let pool_address = Pubkey::new_unique();
        let fixture = PoolAccountFixture::default();
        script_full_pool(&ledger, pool_address, &fixture, 500);

        let views = views(&ledger);
        let mut view = views.subscribe(pool_address);
        assert!(view.recv().await.unwrap().unwrap().value.is_complete());

        // Le compte de pool est clôturé.
        ledger.set_account(pool_address, 3, None);
        let snapshot = loop {
            let snapshot = view.recv().await.unwrap().unwrap().value;
            if !snapshot.pool.exists() {
                break snapshot;
            }
        };
        assert!(snapshot.lp_mint.is_none());
        assert!(snapshot.mint_b_meta.is_none());
        assert!(!snapshot.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn une_erreur_de_branche_termine_la_vue() {
        let ledger = MockLedger::new();
        let pool_address = Pubkey::new_unique();
        let fixture = PoolAccountFixture::default();
        script_full_pool(&ledger, pool_address, &fixture, 500);
        // Le mint LP rendra des octets indécodables.
        ledger.set_account(fixture.lp_mint, 1, Some(raw(b"corrompu".to_vec())));

        let views = views(&ledger);
        let mut view = views.subscribe(pool_address);

        let event = loop {
            match view.recv().await.unwrap() {
                Ok(_) => continue,
                Err(error) => break error,
            }
        };
        assert!(matches!(event, StreamError::Decode { .. }));
        assert!(view.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lacher_la_vue_libere_toutes_les_ressources() {
        let ledger = MockLedger::new();
        let pool_address = Pubkey::new_unique();
        let fixture = PoolAccountFixture::default();
        script_full_pool(&ledger, pool_address, &fixture, 500);

        let views = views(&ledger);
        let mut view = views.subscribe(pool_address);
        assert!(view.recv().await.unwrap().is_ok());
        assert_eq!(ledger.live_account_subscriptions(), 8);

        drop(view);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(ledger.live_account_subscriptions(), 0);
    }
}
