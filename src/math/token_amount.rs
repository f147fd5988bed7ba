// src/math/token_amount.rs

use fixed::types::I80F48;

/// Un montant de jeton à double représentation :
/// - `base` : le montant en unités brutes du mint (lamports du jeton),
/// - `display` : le montant lisible, c'est-à-dire `base / 10^decimals`.
/// Les deux sont portés en virgule fixe (I80F48) pour que les comparaisons
/// et les soustractions restent exactes sur toute la plage d'un u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub base: I80F48,
    pub display: I80F48,
    pub decimals: u8,
}

fn scale_factor(decimals: u8) -> I80F48 {
    // 10^decimals tient largement dans la partie entière d'un I80F48
    // pour toutes les décimales SPL réalistes.
    let mut factor = I80F48::from_num(1);
    let ten = I80F48::from_num(10);
    for _ in 0..decimals {
        factor *= ten;
    }
    factor
}

impl TokenAmount {
    /// Construit un montant depuis des unités brutes.
    pub fn from_base(base: u64, decimals: u8) -> Self {
        let base = I80F48::from_num(base);
        Self {
            base,
            display: base / scale_factor(decimals),
            decimals,
        }
    }

    /// Soustraction terme à terme. Refuse de mélanger des décimales différentes,
    /// le résultat n'aurait aucun sens.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        Some(Self {
            base: self.base - other.base,
            display: self.display - other.display,
            decimals: self.decimals,
        })
    }

    /// Division de deux montants. Le résultat est un ratio sans dimension,
    /// porté dans la même structure (base = ratio remis à l'échelle).
    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        if other.base == I80F48::ZERO {
            return None;
        }
        let ratio = self.base / other.base;
        Some(Self {
            base: ratio * scale_factor(self.decimals),
            display: ratio,
            decimals: self.decimals,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.base == I80F48::ZERO
    }
}
