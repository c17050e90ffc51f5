//! Blackjack rules as a pure state machine.
//!
//! The machine never touches balances. The table charges the wager before
//! [`BlackjackGame::deal`], asks [`BlackjackGame::check`] what an action
//! costs, charges that, and only then calls [`BlackjackGame::act`].

use capo_common::{Balance, IllegalAction, Wager};
use serde::{Deserialize, Serialize};

use crate::cards::{Card, Shoe};

/// Hand total after soft-ace reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub total: u32,
    /// An ace is still counted as 11.
    pub soft: bool,
}

/// Score a hand: aces count 11 and are demoted to 1 one at a time while
/// the total exceeds 21.
pub fn score(cards: &[Card]) -> Score {
    let mut total: u32 = cards.iter().map(Card::value).sum();
    let mut high_aces = cards.iter().filter(|c| c.is_ace()).count();
    while total > 21 && high_aces > 0 {
        total -= 10;
        high_aces -= 1;
    }
    Score {
        total,
        soft: high_aces > 0,
    }
}

/// Two-card 21.
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && score(cards).total == 21
}

/// Dealer draws under 17 and on soft 17.
pub fn dealer_should_draw(cards: &[Card]) -> bool {
    let s = score(cards);
    s.total < 17 || (s.total == 17 && s.soft)
}

/// A player move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackjackAction {
    Hit,
    Stand,
    Double,
    Split,
}

/// One player hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    pub cards: Vec<Card>,
    pub bet: Balance,
    pub doubled: bool,
    /// Hit or doubled at least once.
    pub acted: bool,
    pub finished: bool,
}

impl Hand {
    fn new(cards: Vec<Card>, bet: Balance) -> Self {
        let mut hand = Self {
            cards,
            bet,
            doubled: false,
            acted: false,
            finished: false,
        };
        hand.finish_if_done();
        hand
    }

    pub fn score(&self) -> Score {
        score(&self.cards)
    }

    pub fn is_bust(&self) -> bool {
        self.score().total > 21
    }

    fn finish_if_done(&mut self) {
        if self.score().total >= 21 {
            self.finished = true;
        }
    }

    fn can_double(&self) -> bool {
        !self.finished && !self.doubled && self.cards.len() == 2
    }
}

/// The player's hands: one, or two after a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "hands", rename_all = "snake_case")]
pub enum HandSet {
    Single(Hand),
    Split([Hand; 2]),
}

impl HandSet {
    pub fn as_slice(&self) -> &[Hand] {
        match self {
            HandSet::Single(hand) => std::slice::from_ref(hand),
            HandSet::Split(hands) => hands,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [Hand] {
        match self {
            HandSet::Single(hand) => std::slice::from_mut(hand),
            HandSet::Split(hands) => hands,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, HandSet::Split(_))
    }

    /// Sum of all hand wagers.
    pub fn total_bet(&self) -> Balance {
        self.as_slice().iter().map(|h| h.bet).sum()
    }
}

/// How a hand ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandResult {
    /// Player natural against a non-natural dealer.
    Blackjack,
    Win,
    Push,
    Loss,
    Bust,
}

/// Final result of one hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledHand {
    pub cards: Vec<Card>,
    pub total: u32,
    pub bet: Balance,
    pub result: HandResult,
    pub payout: Balance,
}

/// Final result of a game. `payout` is credited in one ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub hands: Vec<SettledHand>,
    pub dealer: Vec<Card>,
    pub dealer_total: u32,
    pub payout: Balance,
    /// Settled on the initial deal.
    pub natural: bool,
}

impl Settlement {
    /// Total staked across hands.
    pub fn total_bet(&self) -> Balance {
        self.hands.iter().map(|h| h.bet).sum()
    }
}

/// Where the game stands. Before a wager there is no game; dealer
/// resolution happens inside the transition that finishes the last hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    PlayerTurn { hand: usize },
    Settled(Settlement),
}

/// A blackjack game from deal to settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackGame {
    hands: HandSet,
    dealer: Vec<Card>,
    base_bet: Balance,
    phase: Phase,
}

impl BlackjackGame {
    /// Deal two cards each (player first). A natural on either side settles
    /// the game immediately.
    pub fn deal(bet: Wager, shoe: &dyn Shoe) -> Self {
        let player = vec![shoe.draw(), shoe.draw()];
        let dealer = vec![shoe.draw(), shoe.draw()];
        let base_bet = bet.amount();

        let mut game = Self {
            hands: HandSet::Single(Hand {
                cards: player,
                bet: base_bet,
                doubled: false,
                acted: false,
                finished: false,
            }),
            dealer,
            base_bet,
            phase: Phase::PlayerTurn { hand: 0 },
        };

        let player_natural = is_natural(&game.hands.as_slice()[0].cards);
        let dealer_natural = is_natural(&game.dealer);
        if player_natural || dealer_natural {
            game.settle_naturals(player_natural, dealer_natural);
        }
        game
    }

    pub fn hands(&self) -> &HandSet {
        &self.hands
    }

    pub fn dealer(&self) -> &[Card] {
        &self.dealer
    }

    /// The dealer card shown while the player is still acting.
    pub fn dealer_upcard(&self) -> Option<Card> {
        self.dealer.first().copied()
    }

    pub fn base_bet(&self) -> Balance {
        self.base_bet
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn active_hand(&self) -> Option<usize> {
        match self.phase {
            Phase::PlayerTurn { hand } => Some(hand),
            Phase::Settled(_) => None,
        }
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        match &self.phase {
            Phase::Settled(settlement) => Some(settlement),
            Phase::PlayerTurn { .. } => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settlement().is_some()
    }

    /// Validate `action` and return the extra wager it requires.
    pub fn check(&self, action: BlackjackAction) -> Result<Balance, IllegalAction> {
        let index = self.active_hand().ok_or(IllegalAction::HandFinished)?;
        let hand = &self.hands.as_slice()[index];
        if hand.finished {
            return Err(IllegalAction::HandFinished);
        }

        match action {
            BlackjackAction::Hit | BlackjackAction::Stand => Ok(0),
            BlackjackAction::Double if hand.can_double() => Ok(hand.bet),
            BlackjackAction::Double => Err(IllegalAction::DoubleNotAllowed),
            BlackjackAction::Split => {
                let pair = hand.cards.len() == 2 && hand.cards[0].value() == hand.cards[1].value();
                if !self.hands.is_split() && index == 0 && pair && !hand.acted {
                    Ok(self.base_bet)
                } else {
                    Err(IllegalAction::SplitNotAllowed)
                }
            }
        }
    }

    /// Apply `action` to the active hand. Any extra wager reported by
    /// [`check`](Self::check) must already be charged.
    pub fn act(&mut self, action: BlackjackAction, shoe: &dyn Shoe) -> Result<(), IllegalAction> {
        self.check(action)?;
        let index = self.active_hand().ok_or(IllegalAction::HandFinished)?;

        match action {
            BlackjackAction::Hit => {
                let hand = &mut self.hands.as_mut_slice()[index];
                hand.cards.push(shoe.draw());
                hand.acted = true;
                hand.finish_if_done();
            }
            BlackjackAction::Stand => {
                self.hands.as_mut_slice()[index].finished = true;
            }
            BlackjackAction::Double => {
                let hand = &mut self.hands.as_mut_slice()[index];
                hand.bet = hand.bet.saturating_mul(2);
                hand.doubled = true;
                hand.acted = true;
                hand.cards.push(shoe.draw());
                hand.finished = true;
            }
            BlackjackAction::Split => {
                let HandSet::Single(hand) = &self.hands else {
                    return Err(IllegalAction::SplitNotAllowed);
                };
                let (first, second) = (hand.cards[0], hand.cards[1]);
                let bet = self.base_bet;
                self.hands = HandSet::Split([
                    Hand::new(vec![first, shoe.draw()], bet),
                    Hand::new(vec![second, shoe.draw()], bet),
                ]);
            }
        }

        self.advance(shoe);
        Ok(())
    }

    fn advance(&mut self, shoe: &dyn Shoe) {
        match self.hands.as_slice().iter().position(|h| !h.finished) {
            Some(hand) => self.phase = Phase::PlayerTurn { hand },
            None => self.resolve_dealer(shoe),
        }
    }

    fn resolve_dealer(&mut self, shoe: &dyn Shoe) {
        while dealer_should_draw(&self.dealer) {
            self.dealer.push(shoe.draw());
        }

        let dealer_total = score(&self.dealer).total;
        let hands: Vec<SettledHand> = self
            .hands
            .as_slice()
            .iter()
            .map(|hand| {
                let total = hand.score().total;
                let result = if total > 21 {
                    HandResult::Bust
                } else if dealer_total > 21 || total > dealer_total {
                    HandResult::Win
                } else if total == dealer_total {
                    HandResult::Push
                } else {
                    HandResult::Loss
                };
                let payout = match result {
                    HandResult::Win => hand.bet.saturating_mul(2),
                    HandResult::Push => hand.bet,
                    _ => 0,
                };
                SettledHand {
                    cards: hand.cards.clone(),
                    total,
                    bet: hand.bet,
                    result,
                    payout,
                }
            })
            .collect();

        let payout = hands.iter().map(|h| h.payout).sum();
        self.phase = Phase::Settled(Settlement {
            hands,
            dealer: self.dealer.clone(),
            dealer_total,
            payout,
            natural: false,
        });
    }

    fn settle_naturals(&mut self, player_natural: bool, dealer_natural: bool) {
        let bet = self.base_bet;
        let (result, payout) = match (player_natural, dealer_natural) {
            (true, true) => (HandResult::Push, bet),
            (true, false) => (HandResult::Blackjack, bet.saturating_mul(5) / 2),
            _ => (HandResult::Loss, 0),
        };

        let hand = &mut self.hands.as_mut_slice()[0];
        hand.finished = true;
        let settled = SettledHand {
            cards: hand.cards.clone(),
            total: hand.score().total,
            bet,
            result,
            payout,
        };

        self.phase = Phase::Settled(Settlement {
            hands: vec![settled],
            dealer: self.dealer.clone(),
            dealer_total: score(&self.dealer).total,
            payout,
            natural: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, ScriptedShoe, Suit};
    use proptest::prelude::*;

    fn cards(ranks: &[Rank]) -> Vec<Card> {
        ranks.iter().map(|r| Card::new(*r, Suit::Clubs)).collect()
    }

    fn wager(amount: u64) -> Wager {
        Wager::new(amount).unwrap()
    }

    #[test]
    fn test_soft_ace_scoring() {
        assert_eq!(score(&cards(&[Rank::Ace, Rank::Six])), Score { total: 17, soft: true });
        assert_eq!(
            score(&cards(&[Rank::Ace, Rank::Six, Rank::Ten])),
            Score { total: 17, soft: false }
        );
        assert_eq!(
            score(&cards(&[Rank::Ace, Rank::Ace, Rank::Nine])),
            Score { total: 21, soft: true }
        );
        assert_eq!(
            score(&cards(&[Rank::King, Rank::Queen, Rank::Two])),
            Score { total: 22, soft: false }
        );
    }

    #[test]
    fn test_dealer_hits_soft_seventeen() {
        assert!(dealer_should_draw(&cards(&[Rank::Ace, Rank::Six])));
        assert!(!dealer_should_draw(&cards(&[Rank::Ten, Rank::Seven])));
        assert!(dealer_should_draw(&cards(&[Rank::Ten, Rank::Six])));
        assert!(!dealer_should_draw(&cards(&[Rank::Ace, Rank::Seven])));
    }

    #[test]
    fn test_dealer_soft_seventeen_draws_during_resolution() {
        // Player 10+9 stands; dealer A+6 must draw (a four, making 21).
        let shoe = ScriptedShoe::new(&[Rank::Ten, Rank::Nine, Rank::Ace, Rank::Six, Rank::Four]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Stand, &shoe).unwrap();

        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.dealer.len(), 3);
        assert_eq!(settlement.dealer_total, 21);
        assert_eq!(settlement.hands[0].result, HandResult::Loss);
        assert_eq!(settlement.payout, 0);
    }

    #[test]
    fn test_dealer_hard_seventeen_stands() {
        let shoe = ScriptedShoe::new(&[Rank::Ten, Rank::Eight, Rank::Ten, Rank::Seven]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Stand, &shoe).unwrap();

        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.dealer.len(), 2);
        assert_eq!(settlement.hands[0].result, HandResult::Win);
        assert_eq!(settlement.payout, 20);
    }

    #[test]
    fn test_player_natural_settles_immediately() {
        let shoe = ScriptedShoe::new(&[Rank::Ace, Rank::King, Rank::Nine, Rank::Seven]);
        let game = BlackjackGame::deal(wager(15), &shoe);

        assert!(game.active_hand().is_none());
        let settlement = game.settlement().unwrap();
        assert!(settlement.natural);
        assert_eq!(settlement.hands[0].result, HandResult::Blackjack);
        // floor(15 * 2.5)
        assert_eq!(settlement.payout, 37);
        assert_eq!(settlement.dealer.len(), 2);
    }

    #[test]
    fn test_dealer_natural_and_double_natural() {
        let shoe = ScriptedShoe::new(&[Rank::Ten, Rank::Nine, Rank::Ace, Rank::Queen]);
        let game = BlackjackGame::deal(wager(10), &shoe);
        assert_eq!(game.settlement().unwrap().payout, 0);

        let shoe = ScriptedShoe::new(&[Rank::Ace, Rank::Jack, Rank::King, Rank::Ace]);
        let game = BlackjackGame::deal(wager(10), &shoe);
        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.hands[0].result, HandResult::Push);
        assert_eq!(settlement.payout, 10);
    }

    #[test]
    fn test_hit_to_bust_is_a_loss() {
        let shoe = ScriptedShoe::new(&[Rank::Ten, Rank::Six, Rank::Ten, Rank::Seven, Rank::King]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Hit, &shoe).unwrap();

        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.hands[0].result, HandResult::Bust);
        assert_eq!(settlement.payout, 0);
    }

    #[test]
    fn test_hit_to_twenty_one_auto_stands() {
        let shoe = ScriptedShoe::new(&[
            Rank::Five,
            Rank::Six,
            Rank::Ten,
            Rank::Eight,
            Rank::Ten,
        ]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Hit, &shoe).unwrap();

        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.hands[0].total, 21);
        assert_eq!(settlement.hands[0].result, HandResult::Win);
    }

    #[test]
    fn test_double_rules() {
        let shoe = ScriptedShoe::new(&[Rank::Five, Rank::Six, Rank::Ten, Rank::Seven, Rank::Two]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        assert_eq!(game.check(BlackjackAction::Double), Ok(10));

        game.act(BlackjackAction::Hit, &shoe).unwrap();
        assert_eq!(
            game.check(BlackjackAction::Double),
            Err(IllegalAction::DoubleNotAllowed)
        );
    }

    #[test]
    fn test_double_draws_one_and_stands() {
        let shoe = ScriptedShoe::new(&[Rank::Five, Rank::Six, Rank::Ten, Rank::Seven, Rank::Two]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Double, &shoe).unwrap();

        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.hands[0].cards.len(), 3);
        assert_eq!(settlement.hands[0].bet, 20);
        // 13 against 17
        assert_eq!(settlement.hands[0].result, HandResult::Loss);
    }

    #[test]
    fn test_split_requires_equal_values() {
        let shoe = ScriptedShoe::new(&[Rank::Ten, Rank::Nine, Rank::Ten, Rank::Seven]);
        let game = BlackjackGame::deal(wager(10), &shoe);
        assert_eq!(
            game.check(BlackjackAction::Split),
            Err(IllegalAction::SplitNotAllowed)
        );

        let shoe = ScriptedShoe::new(&[Rank::King, Rank::Queen, Rank::Ten, Rank::Seven]);
        let game = BlackjackGame::deal(wager(10), &shoe);
        assert_eq!(game.check(BlackjackAction::Split), Ok(10));
    }

    #[test]
    fn test_split_plays_both_hands() {
        // Player 8,8; dealer 10,7; split deals 3 then 10.
        let shoe = ScriptedShoe::new(&[
            Rank::Eight,
            Rank::Eight,
            Rank::Ten,
            Rank::Seven,
            Rank::Three,
            Rank::Ten,
        ]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Split, &shoe).unwrap();

        assert!(game.hands().is_split());
        assert_eq!(game.hands().total_bet(), 20);
        assert_eq!(game.active_hand(), Some(0));
        assert_eq!(
            game.check(BlackjackAction::Split),
            Err(IllegalAction::SplitNotAllowed)
        );
        // Doubling is allowed again on a fresh split hand.
        assert_eq!(game.check(BlackjackAction::Double), Ok(10));

        game.act(BlackjackAction::Stand, &shoe).unwrap();
        assert_eq!(game.active_hand(), Some(1));
        game.act(BlackjackAction::Stand, &shoe).unwrap();

        let settlement = game.settlement().unwrap();
        assert_eq!(settlement.hands.len(), 2);
        // 11 loses to 17, 18 beats 17.
        assert_eq!(settlement.hands[0].result, HandResult::Loss);
        assert_eq!(settlement.hands[1].result, HandResult::Win);
        assert_eq!(settlement.payout, 20);
    }

    #[test]
    fn test_split_after_hit_rejected() {
        let shoe = ScriptedShoe::new(&[Rank::Two, Rank::Two, Rank::Ten, Rank::Seven, Rank::Two]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        game.act(BlackjackAction::Hit, &shoe).unwrap();
        assert_eq!(
            game.check(BlackjackAction::Split),
            Err(IllegalAction::SplitNotAllowed)
        );
    }

    #[test]
    fn test_settled_game_rejects_actions() {
        let shoe = ScriptedShoe::new(&[Rank::Ace, Rank::King, Rank::Nine, Rank::Seven]);
        let mut game = BlackjackGame::deal(wager(10), &shoe);
        assert_eq!(
            game.act(BlackjackAction::Hit, &shoe),
            Err(IllegalAction::HandFinished)
        );
    }

    fn rank_strategy() -> impl Strategy<Value = Rank> {
        (0usize..13).prop_map(|i| Rank::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_score_is_best_total(ranks in proptest::collection::vec(rank_strategy(), 1..8)) {
            let hand = cards(&ranks);
            let low: u32 = ranks.iter().map(|r| if *r == Rank::Ace { 1 } else { r.value() }).sum();
            let has_ace = ranks.contains(&Rank::Ace);
            let expected_soft = has_ace && low + 10 <= 21;
            let expected = if expected_soft { low + 10 } else { low };

            let s = score(&hand);
            prop_assert_eq!(s.total, expected);
            prop_assert_eq!(s.soft, expected_soft);
        }

        #[test]
        fn prop_dealer_finishes_at_seventeen_or_more(seed in any::<u64>()) {
            let shoe = crate::cards::RandomShoe::new(crate::rng::GameRng::seeded(seed));
            let mut game = BlackjackGame::deal(wager(10), &shoe);
            while !game.is_settled() {
                game.act(BlackjackAction::Stand, &shoe).unwrap();
            }
            let settlement = game.settlement().unwrap();
            if !settlement.natural {
                prop_assert!(settlement.dealer_total >= 17);
                prop_assert!(!dealer_should_draw(&settlement.dealer));
            }
        }
    }
}
