//! Spend selection over fixed denominations.
//!
//! Largest denominations first without overshooting; if that cannot hit
//! the target exactly, one larger mint covers the shortfall and the small
//! mints it makes redundant are dropped again.

use crate::error::{Result, ZerocoinError};
use crate::mint::Mint;

pub fn select_mints<'a>(target: i64, candidates: &'a [Mint], max_spends: usize) -> Result<Vec<&'a Mint>> {
    if target <= 0 {
        return Err(ZerocoinError::DenominationInvalid(target));
    }

    let mut pool: Vec<&Mint> = candidates.iter().filter(|m| m.is_spendable()).collect();
    pool.sort_by(|a, b| {
        b.denomination()
            .cmp(&a.denomination())
            .then(a.origin_height().cmp(&b.origin_height()))
    });

    let available: i64 = pool.iter().map(|m| m.denomination().to_amount()).sum();
    if available < target {
        return Err(ZerocoinError::InsufficientFunds {
            requested: target,
            available,
        });
    }

    let mut selected = vec![false; pool.len()];
    let mut total = 0i64;
    for (i, mint) in pool.iter().enumerate() {
        let amount = mint.denomination().to_amount();
        if total + amount <= target {
            selected[i] = true;
            total += amount;
            if total == target {
                break;
            }
        }
    }

    if total < target {
        // Every skipped mint is larger than the shortfall
        let shortfall = target - total;
        let cover = pool
            .iter()
            .enumerate()
            .filter(|(i, m)| !selected[*i] && m.denomination().to_amount() >= shortfall)
            .min_by_key(|(_, m)| m.denomination())
            .map(|(i, _)| i);
        let Some(cover) = cover else {
            return Err(ZerocoinError::InsufficientFunds {
                requested: target,
                available,
            });
        };
        selected[cover] = true;
        total += pool[cover].denomination().to_amount();

        // Smallest first, since pool is sorted descending
        for i in (0..pool.len()).rev() {
            if i == cover || !selected[i] {
                continue;
            }
            let amount = pool[i].denomination().to_amount();
            if total - amount >= target {
                selected[i] = false;
                total -= amount;
            }
        }
    }

    let chosen: Vec<&Mint> = pool
        .into_iter()
        .zip(selected)
        .filter_map(|(mint, keep)| keep.then_some(mint))
        .collect();
    if chosen.len() > max_spends {
        return Err(ZerocoinError::TooManySpends {
            needed: chosen.len(),
            max: max_spends,
        });
    }
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denomination::{Denomination, COIN};
    use crate::mint::{CommitmentEngine, MaturityState};

    fn mature(denomination: Denomination, origin: u64) -> Mint {
        let (mut mint, _) = CommitmentEngine::default().create_mint(denomination).unwrap();
        mint.maturity = MaturityState::Mature;
        mint.origin_height = Some(origin);
        mint
    }

    fn values(selected: &[&Mint]) -> Vec<i64> {
        selected.iter().map(|m| m.denomination().value()).collect()
    }

    #[test]
    fn test_exact_greedy_selection() {
        let mints = vec![
            mature(Denomination::One, 1),
            mature(Denomination::Ten, 2),
            mature(Denomination::Five, 3),
            mature(Denomination::One, 4),
        ];
        let selected = select_mints(16 * COIN, &mints, 7).unwrap();
        assert_eq!(values(&selected), vec![10, 5, 1]);
        assert_eq!(selected[2].origin_height(), Some(1));
    }

    #[test]
    fn test_overshoot_uses_smallest_larger_mint() {
        let mints = vec![
            mature(Denomination::Fifty, 1),
            mature(Denomination::Ten, 2),
            mature(Denomination::One, 3),
        ];
        // 10 + 1 fall short of 12; 50 covers it and both small mints become redundant
        let selected = select_mints(12 * COIN, &mints, 7).unwrap();
        assert_eq!(values(&selected), vec![50]);
    }

    #[test]
    fn test_insufficient_funds() {
        let mints = vec![mature(Denomination::Five, 1)];
        assert!(matches!(
            select_mints(6 * COIN, &mints, 7),
            Err(ZerocoinError::InsufficientFunds { available, .. }) if available == 5 * COIN
        ));
    }

    #[test]
    fn test_immature_and_pending_mints_skipped() {
        let (immature, _) = CommitmentEngine::default()
            .create_mint(Denomination::Ten)
            .unwrap();
        let mut pending = mature(Denomination::Ten, 1);
        pending.spend_state = crate::mint::SpendState::Pending;
        let mints = vec![immature, pending, mature(Denomination::One, 2)];
        assert!(matches!(
            select_mints(10 * COIN, &mints, 7),
            Err(ZerocoinError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_spend_count_limit() {
        let mints: Vec<Mint> = (0..4).map(|i| mature(Denomination::One, i)).collect();
        assert!(matches!(
            select_mints(4 * COIN, &mints, 3),
            Err(ZerocoinError::TooManySpends { needed: 4, max: 3 })
        ));
    }
}
