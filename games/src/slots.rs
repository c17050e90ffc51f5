//! Three-by-three slot machine with eight paylines.

use std::sync::Arc;

use capo_common::{AccountRef, Balance, EconomyError, IllegalAction, Rejection, Result};
use capo_ledger::LedgerEngine;
use dashmap::DashMap;
use rand::distributions::WeightedIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::rng::GameRng;
use crate::stake;

/// Reel symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Cherry,
    Lemon,
    Bell,
    Bar,
    Seven,
    /// Only on the reels of the eight-line tiers.
    Diamond,
}

impl Symbol {
    const BASE: [(Symbol, u32); 5] = [
        (Symbol::Cherry, 30),
        (Symbol::Lemon, 25),
        (Symbol::Bell, 20),
        (Symbol::Bar, 15),
        (Symbol::Seven, 9),
    ];
    const DIAMOND_WEIGHT: u32 = 1;
}

/// Number of paylines.
pub const LINE_COUNT: usize = 8;

/// Paylines as (row, column) cells, in selection order.
pub const PAYLINES: [[(usize, usize); 3]; LINE_COUNT] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(2, 0), (1, 1), (0, 2)],
    [(0, 0), (1, 1), (0, 2)],
    [(2, 0), (1, 1), (2, 2)],
    [(0, 1), (1, 1), (2, 1)],
];

/// Jackpot rules of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jackpot {
    pub amount: Balance,
    /// The jackpot roll succeeds with probability 1 / `odds`.
    pub odds: u32,
}

/// Wager tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotTier {
    Single,
    AllLines,
    MaxBet,
}

impl SlotTier {
    pub fn price_per_line(&self) -> Balance {
        match self {
            SlotTier::Single => 5,
            SlotTier::AllLines => 20,
            SlotTier::MaxBet => 50,
        }
    }

    pub fn payout_per_line(&self) -> Balance {
        match self {
            SlotTier::Single => 10,
            SlotTier::AllLines => 40,
            SlotTier::MaxBet => 100,
        }
    }

    pub fn jackpot(&self) -> Option<Jackpot> {
        match self {
            SlotTier::Single => None,
            SlotTier::AllLines => Some(Jackpot {
                amount: 1_000,
                odds: 4,
            }),
            SlotTier::MaxBet => Some(Jackpot {
                amount: 3_200,
                odds: 5,
            }),
        }
    }

    /// Symbols and weights on this tier's reels.
    pub fn reel(&self) -> Vec<(Symbol, u32)> {
        let mut reel = Symbol::BASE.to_vec();
        if self.jackpot().is_some() {
            reel.push((Symbol::Diamond, Symbol::DIAMOND_WEIGHT));
        }
        reel
    }
}

/// A validated tier and line count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotSelection {
    tier: SlotTier,
    lines: u8,
}

impl SlotSelection {
    /// Single plays 1 to 7 lines; the other tiers always play all 8.
    /// `None` selects all 8 for them.
    pub fn new(tier: SlotTier, lines: Option<u8>) -> std::result::Result<Self, IllegalAction> {
        let lines = match (tier, lines) {
            (SlotTier::Single, Some(n @ 1..=7)) => n,
            (SlotTier::Single, _) => return Err(IllegalAction::InvalidLineCount),
            (_, None) => LINE_COUNT as u8,
            (_, Some(n)) if usize::from(n) == LINE_COUNT => n,
            (_, Some(_)) => return Err(IllegalAction::InvalidLineCount),
        };
        Ok(Self { tier, lines })
    }

    pub fn tier(&self) -> SlotTier {
        self.tier
    }

    pub fn lines(&self) -> usize {
        usize::from(self.lines)
    }

    /// Total stake for one spin.
    pub fn wager(&self) -> Balance {
        self.tier.price_per_line() * u64::from(self.lines)
    }
}

/// Reel result, indexed `[row][column]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid(pub [[Symbol; 3]; 3]);

impl Grid {
    fn line(&self, line: usize) -> [Symbol; 3] {
        PAYLINES[line].map(|(row, col)| self.0[row][col])
    }

    /// Indexes of the winning lines among the first `lines` paylines.
    pub fn winning_lines(&self, lines: usize) -> Vec<usize> {
        (0..lines.min(LINE_COUNT))
            .filter(|&i| {
                let [a, b, c] = self.line(i);
                a == b && b == c
            })
            .collect()
    }
}

/// Money side of one spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinPayout {
    pub wager: Balance,
    pub payout: Balance,
    pub jackpot: bool,
}

impl SpinPayout {
    /// Payout minus wager.
    pub fn net(&self) -> i64 {
        self.payout as i64 - self.wager as i64
    }
}

/// Price a spin. The jackpot replaces the line payout only when the tier
/// has one, all eight lines won and the independent roll succeeded.
pub fn settle(selection: &SlotSelection, winning_lines: usize, jackpot_roll: bool) -> SpinPayout {
    let tier = selection.tier();
    let base = tier.payout_per_line() * winning_lines as u64;

    match tier.jackpot() {
        Some(jackpot) if winning_lines == LINE_COUNT && jackpot_roll => SpinPayout {
            wager: selection.wager(),
            payout: jackpot.amount,
            jackpot: true,
        },
        _ => SpinPayout {
            wager: selection.wager(),
            payout: base,
            jackpot: false,
        },
    }
}

/// Everything about a finished spin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinOutcome {
    pub selection: SlotSelection,
    pub grid: Grid,
    pub winning_lines: Vec<usize>,
    pub payout: SpinPayout,
    pub balance: Balance,
}

/// Slot machine. Remembers each player's last selection for replays.
pub struct SlotMachine {
    ledger: Arc<LedgerEngine>,
    rng: GameRng,
    single_reel: (Vec<Symbol>, WeightedIndex<u32>),
    jackpot_reel: (Vec<Symbol>, WeightedIndex<u32>),
    last_selection: DashMap<AccountRef, SlotSelection>,
}

fn build_reel(tier: SlotTier) -> Result<(Vec<Symbol>, WeightedIndex<u32>)> {
    let (symbols, weights): (Vec<Symbol>, Vec<u32>) = tier.reel().into_iter().unzip();
    let index = WeightedIndex::new(weights)
        .map_err(|e| EconomyError::Configuration(format!("slot reel for {tier:?}: {e}")))?;
    Ok((symbols, index))
}

impl SlotMachine {
    pub fn new(ledger: Arc<LedgerEngine>, rng: GameRng) -> Result<Self> {
        Ok(Self {
            ledger,
            rng,
            single_reel: build_reel(SlotTier::Single)?,
            jackpot_reel: build_reel(SlotTier::MaxBet)?,
            last_selection: DashMap::new(),
        })
    }

    /// Draw a grid for `tier`.
    pub fn draw_grid(&self, tier: SlotTier) -> Grid {
        let (symbols, weights) = match tier {
            SlotTier::Single => &self.single_reel,
            SlotTier::AllLines | SlotTier::MaxBet => &self.jackpot_reel,
        };
        let mut grid = [[Symbol::Cherry; 3]; 3];
        for row in grid.iter_mut() {
            for cell in row.iter_mut() {
                *cell = symbols[self.rng.weighted(weights)];
            }
        }
        Grid(grid)
    }

    /// Charge, spin and pay. A declined wager spins nothing.
    #[instrument(skip(self, account), fields(account = %account))]
    pub async fn spin(
        &self,
        account: &AccountRef,
        selection: SlotSelection,
    ) -> Result<std::result::Result<SpinOutcome, Rejection>> {
        let wager = selection.wager();
        let mut balance = match stake::charge(&self.ledger, account, wager, "slots spin").await? {
            Ok(balance) => balance,
            Err(rejection) => return Ok(Err(rejection)),
        };
        self.last_selection.insert(account.clone(), selection);

        let grid = self.draw_grid(selection.tier());
        let winning_lines = grid.winning_lines(selection.lines());
        let jackpot_roll = match selection.tier().jackpot() {
            Some(jackpot) if winning_lines.len() == LINE_COUNT => self.rng.chance(1, jackpot.odds),
            _ => false,
        };
        let payout = settle(&selection, winning_lines.len(), jackpot_roll);

        if payout.payout > 0 {
            balance = stake::pay(&self.ledger, account, payout.payout, "slots payout").await?;
        }

        if payout.jackpot {
            info!(tier = ?selection.tier(), amount = payout.payout, "Slots jackpot");
        } else {
            debug!(wins = winning_lines.len(), payout = payout.payout, "Slots spun");
        }

        Ok(Ok(SpinOutcome {
            selection,
            grid,
            winning_lines,
            payout,
            balance,
        }))
    }

    /// Spin again with the player's previous selection.
    pub async fn replay(
        &self,
        account: &AccountRef,
    ) -> Result<std::result::Result<SpinOutcome, Rejection>> {
        let last = self.last_selection.get(account).map(|s| *s);
        match last {
            Some(selection) => self.spin(account, selection).await,
            None => Ok(Err(IllegalAction::NothingToReplay.into())),
        }
    }

    /// The selection a replay would use.
    pub fn last_selection(&self, account: &AccountRef) -> Option<SlotSelection> {
        self.last_selection.get(account).map(|s| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_common::{Initiator, TransactionCategory};
    use capo_ledger::{MemoryStore, MutationRequest};
    use proptest::prelude::*;
    use Symbol::*;

    #[test]
    fn test_single_tier_partial_win() {
        let selection = SlotSelection::new(SlotTier::Single, Some(3)).unwrap();
        assert_eq!(selection.wager(), 15);

        let grid = Grid([
            [Cherry, Lemon, Bell],
            [Seven, Seven, Seven],
            [Bar, Cherry, Lemon],
        ]);
        let wins = grid.winning_lines(selection.lines());
        assert_eq!(wins, vec![1]);

        let payout = settle(&selection, wins.len(), false);
        assert_eq!(payout.payout, 10);
        assert_eq!(payout.net(), -5);
    }

    #[test]
    fn test_max_bet_jackpot_overrides_lines() {
        let selection = SlotSelection::new(SlotTier::MaxBet, None).unwrap();
        assert_eq!(selection.wager(), 400);

        let grid = Grid([[Diamond; 3]; 3]);
        let wins = grid.winning_lines(selection.lines());
        assert_eq!(wins.len(), LINE_COUNT);

        let hit = settle(&selection, wins.len(), true);
        assert_eq!(hit.payout, 3_200);
        assert!(hit.jackpot);

        let miss = settle(&selection, wins.len(), false);
        assert_eq!(miss.payout, 800);
        assert!(!miss.jackpot);
    }

    #[test]
    fn test_jackpot_needs_all_lines() {
        let selection = SlotSelection::new(SlotTier::AllLines, Some(8)).unwrap();
        let payout = settle(&selection, 7, true);
        assert_eq!(payout.payout, 280);
        assert!(!payout.jackpot);
    }

    #[test]
    fn test_single_tier_has_no_jackpot() {
        let selection = SlotSelection::new(SlotTier::Single, Some(7)).unwrap();
        let payout = settle(&selection, 7, true);
        assert_eq!(payout.payout, 70);
        assert!(!SlotTier::Single.reel().iter().any(|(s, _)| *s == Diamond));
    }

    #[test]
    fn test_line_count_validation() {
        assert_eq!(
            SlotSelection::new(SlotTier::Single, Some(8)),
            Err(IllegalAction::InvalidLineCount)
        );
        assert_eq!(
            SlotSelection::new(SlotTier::Single, None),
            Err(IllegalAction::InvalidLineCount)
        );
        assert_eq!(
            SlotSelection::new(SlotTier::AllLines, Some(3)),
            Err(IllegalAction::InvalidLineCount)
        );
        assert_eq!(SlotSelection::new(SlotTier::AllLines, None).unwrap().lines(), 8);
    }

    #[test]
    fn test_paylines_are_distinct() {
        for i in 0..LINE_COUNT {
            for j in (i + 1)..LINE_COUNT {
                assert_ne!(PAYLINES[i], PAYLINES[j]);
            }
        }
    }

    async fn machine(balance: i64, seed: u64) -> (SlotMachine, Arc<LedgerEngine>, AccountRef) {
        let ledger = Arc::new(LedgerEngine::new(Arc::new(MemoryStore::new())));
        let account = AccountRef::new("1", "2");
        ledger
            .apply(MutationRequest::new(
                account.clone(),
                balance,
                TransactionCategory::AdminGrant,
                Initiator::System,
            ))
            .await
            .unwrap();
        (
            SlotMachine::new(ledger.clone(), GameRng::seeded(seed)).unwrap(),
            ledger,
            account,
        )
    }

    #[tokio::test]
    async fn test_declined_spin_draws_nothing() {
        let (machine, ledger, account) = machine(10, 1).await;
        let selection = SlotSelection::new(SlotTier::AllLines, None).unwrap();
        let result = machine.spin(&account, selection).await.unwrap();
        assert!(matches!(result, Err(Rejection::InsufficientFunds { .. })));
        assert!(machine.last_selection(&account).is_none());
        assert_eq!(ledger.balance(&account).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_spin_and_replay() {
        let (machine, ledger, account) = machine(1_000, 7).await;
        assert_eq!(
            machine.replay(&account).await.unwrap(),
            Err(IllegalAction::NothingToReplay.into())
        );

        let selection = SlotSelection::new(SlotTier::Single, Some(5)).unwrap();
        let first = machine.spin(&account, selection).await.unwrap().unwrap();
        assert_eq!(first.payout.wager, 25);
        assert_eq!(
            first.balance as i64,
            1_000 + first.payout.net()
        );

        let again = machine.replay(&account).await.unwrap().unwrap();
        assert_eq!(again.selection, selection);
        assert!(ledger.audit(&account).await.unwrap().is_ok());
    }

    fn symbol_strategy() -> impl Strategy<Value = Symbol> {
        prop_oneof![
            Just(Cherry),
            Just(Lemon),
            Just(Bell),
            Just(Bar),
            Just(Seven),
            Just(Diamond)
        ]
    }

    proptest! {
        #[test]
        fn prop_payout_is_lines_times_rate(
            cells in proptest::collection::vec(symbol_strategy(), 9),
            lines in 1u8..=7,
        ) {
            let grid = Grid([
                [cells[0], cells[1], cells[2]],
                [cells[3], cells[4], cells[5]],
                [cells[6], cells[7], cells[8]],
            ]);
            let selection = SlotSelection::new(SlotTier::Single, Some(lines)).unwrap();
            let wins = grid.winning_lines(selection.lines());
            prop_assert!(wins.iter().all(|&i| i < usize::from(lines)));

            let payout = settle(&selection, wins.len(), true);
            prop_assert_eq!(payout.payout, 10 * wins.len() as u64);
            prop_assert_eq!(payout.wager, 5 * u64::from(lines));
        }
    }
}
