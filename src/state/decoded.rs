// DANS : src/state/decoded.rs

use crate::state::account_stream::AccountStream;
use crate::state::{MaybeAccount, Observed, StreamError, StreamEvent};
use solana_sdk::pubkey::Pubkey;

/// Une fonction de décodage pure : les octets d'un compte existant vers sa
/// représentation typée. L'échec n'est pas une condition transitoire.
pub type DecodeFn<T> = fn(&Pubkey, &[u8]) -> anyhow::Result<T>;

/// Une vue décodée d'un flux de compte brut. L'absence traverse telle
/// quelle ; la présence passe par `decode`. Un échec de décodage termine la
/// vue : un compte malformé est un bug de version de layout, pas un état à
/// rattraper.
pub struct DecodedAccountView<T> {
    raw: AccountStream,
    decode: DecodeFn<T>,
    done: bool,
}

impl<T> DecodedAccountView<T> {
    pub fn new(raw: AccountStream, decode: DecodeFn<T>) -> Self {
        Self {
            raw,
            decode,
            done: false,
        }
    }

    pub fn address(&self) -> &Pubkey {
        self.raw.address()
    }

    pub async fn recv(&mut self) -> Option<StreamEvent<MaybeAccount<T>>> {
        if self.done {
            return None;
        }
        let address = *self.raw.address();
        let event = self.raw.recv().await?;

        Some(match event {
            Err(error) => {
                self.done = true;
                Err(error)
            }
            Ok(Observed { slot, value: None }) => Ok(Observed {
                slot,
                value: MaybeAccount::Absent { address },
            }),
            Ok(Observed {
                slot,
                value: Some(raw_account),
            }) => {
                // Un compte à zéro lamport a été clôturé : le nœud le notifie
                // ainsi au lieu d'une absence franche.
                if raw_account.lamports == 0 {
                    return Some(Ok(Observed {
                        slot,
                        value: MaybeAccount::Absent { address },
                    }));
                }
                match (self.decode)(&address, &raw_account.data) {
                    Ok(data) => Ok(Observed {
                        slot,
                        value: MaybeAccount::Present {
                            address,
                            owner: raw_account.owner,
                            lamports: raw_account.lamports,
                            data,
                        },
                    }),
                    Err(error) => {
                        self.done = true;
                        Err(StreamError::Decode {
                            address,
                            reason: format!("{error:#}"),
                        })
                    }
                }
            }
        })
    }
}
