//! Playing cards and shoes.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::rng::GameRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Blackjack value with the ace counted high.
    pub fn value(&self) -> u32 {
        match self {
            Rank::Ace => 11,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    pub fn value(&self) -> u32 {
        self.rank.value()
    }

    pub fn is_ace(&self) -> bool {
        self.rank == Rank::Ace
    }
}

/// Source of cards.
pub trait Shoe: Send + Sync {
    fn draw(&self) -> Card;
}

/// Infinite shoe: every draw is an independent uniform pick from a full
/// deck, so cards are drawn with replacement.
#[derive(Debug, Clone)]
pub struct RandomShoe {
    rng: GameRng,
}

impl RandomShoe {
    pub fn new(rng: GameRng) -> Self {
        Self { rng }
    }
}

impl Shoe for RandomShoe {
    fn draw(&self) -> Card {
        let rank = Rank::ALL[self.rng.range_inclusive(0, 12) as usize];
        let suit = Suit::ALL[self.rng.range_inclusive(0, 3) as usize];
        Card::new(rank, suit)
    }
}

/// Deals a fixed sequence of cards, then falls back to another shoe.
pub struct ScriptedShoe {
    script: Mutex<VecDeque<Card>>,
    fallback: Box<dyn Shoe>,
}

impl ScriptedShoe {
    /// Deal `ranks` in order (suits cycle), then tens forever.
    pub fn new(ranks: &[Rank]) -> Self {
        let script = ranks
            .iter()
            .enumerate()
            .map(|(i, rank)| Card::new(*rank, Suit::ALL[i % Suit::ALL.len()]))
            .collect();
        Self {
            script: Mutex::new(script),
            fallback: Box::new(ConstantShoe(Card::new(Rank::Ten, Suit::Spades))),
        }
    }

    /// Append more cards to the script.
    pub fn push(&self, ranks: &[Rank]) {
        let mut script = self.script.lock();
        for rank in ranks {
            script.push_back(Card::new(*rank, Suit::Hearts));
        }
    }

    /// Cards left in the script.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl Shoe for ScriptedShoe {
    fn draw(&self) -> Card {
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.draw())
    }
}

struct ConstantShoe(Card);

impl Shoe for ConstantShoe {
    fn draw(&self) -> Card {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_cards_are_ten() {
        for rank in [Rank::Ten, Rank::Jack, Rank::Queen, Rank::King] {
            assert_eq!(rank.value(), 10);
        }
        assert_eq!(Rank::Ace.value(), 11);
    }

    #[test]
    fn test_scripted_shoe_then_fallback() {
        let shoe = ScriptedShoe::new(&[Rank::Ace, Rank::Six]);
        assert_eq!(shoe.draw().rank, Rank::Ace);
        assert_eq!(shoe.draw().rank, Rank::Six);
        assert_eq!(shoe.remaining(), 0);
        assert_eq!(shoe.draw().rank, Rank::Ten);
    }

    #[test]
    fn test_random_shoe_covers_ranks() {
        let shoe = RandomShoe::new(GameRng::seeded(3));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2_000 {
            seen.insert(shoe.draw().rank);
        }
        assert_eq!(seen.len(), 13);
    }
}
