// src/state/mod.rs

// Le moteur de synchronisation d'état : des flux d'événements par compte,
// composés en vues décodées puis en vues composites par pool.
pub mod account_stream;
pub mod decoded;
pub mod multicast;
pub mod pool_view;

use solana_sdk::pubkey::Pubkey;

/// Horloge logique attachée à chaque observation. Purement informative :
/// les flux sont indépendamment convergents, aucun ordre inter-flux n'est
/// garanti par ce slot.
pub type Slot = u64;

/// Une valeur observée sur la chaîne, estampillée de son slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed<T> {
    pub slot: Slot,
    pub value: T,
}

/// Erreur terminale portée en bande dans un flux. Clonable parce que les
/// flux sont multicast : chaque abonné reçoit sa copie.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// La couche transport a échoué (établissement ou fin du flux distant).
    #[error("échec transport: {0}")]
    Transport(String),

    /// Les octets du compte ne correspondent pas au layout attendu. Ce n'est
    /// pas une condition transitoire : c'est un bug de version de programme.
    #[error("échec de décodage du compte {address}: {reason}")]
    Decode { address: Pubkey, reason: String },
}

/// Un événement de flux : une observation, ou l'erreur qui termine le flux.
pub type StreamEvent<T> = Result<Observed<T>, StreamError>;

/// L'état tri-valué d'un compte distant : confirmé absent, ou présent avec
/// ses données décodées. Quand un compte bascule d'un état à l'autre, tout
/// état dérivé mis en cache par les consommateurs est périmé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeAccount<T> {
    Absent {
        address: Pubkey,
    },
    Present {
        address: Pubkey,
        owner: Pubkey,
        lamports: u64,
        data: T,
    },
}

impl<T> MaybeAccount<T> {
    pub fn address(&self) -> &Pubkey {
        match self {
            MaybeAccount::Absent { address } => address,
            MaybeAccount::Present { address, .. } => address,
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self, MaybeAccount::Present { .. })
    }

    /// Accès aux données si le compte existe.
    pub fn existing(&self) -> Option<&T> {
        match self {
            MaybeAccount::Absent { .. } => None,
            MaybeAccount::Present { data, .. } => Some(data),
        }
    }

    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> MaybeAccount<U> {
        match self {
            MaybeAccount::Absent { address } => MaybeAccount::Absent { address },
            MaybeAccount::Present {
                address,
                owner,
                lamports,
                data,
            } => MaybeAccount::Present {
                address,
                owner,
                lamports,
                data: f(data),
            },
        }
    }

    /// Comme `map_data`, mais la projection peut échouer. L'absence traverse
    /// telle quelle.
    pub fn filter_map_data<U>(self, f: impl FnOnce(T) -> Option<U>) -> Option<MaybeAccount<U>> {
        match self {
            MaybeAccount::Absent { address } => Some(MaybeAccount::Absent { address }),
            MaybeAccount::Present {
                address,
                owner,
                lamports,
                data,
            } => f(data).map(|data| MaybeAccount::Present {
                address,
                owner,
                lamports,
                data,
            }),
        }
    }
}
