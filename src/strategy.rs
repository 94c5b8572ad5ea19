use crate::types::Parity;
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;

/// Everything a player knows when asked to call parity.
#[derive(Debug, Clone)]
pub struct ChoiceContext {
    pub match_id: String,
    pub opponent_id: String,
    pub round_id: u32,
}

/// Decision policy seam for the player role. Implementations must be
/// cheap and non-blocking; they run inside the request handler.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn choose(&self, ctx: &ChoiceContext) -> Parity;
}

/// Uniform coin flip from OS entropy. The default.
pub struct RandomStrategy;

impl Strategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&self, _ctx: &ChoiceContext) -> Parity {
        if OsRng.gen_bool(0.5) {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

/// Always calls the same symbol. Useful for scripted opponents.
pub struct FixedStrategy(pub Parity);

impl Strategy for FixedStrategy {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn choose(&self, _ctx: &ChoiceContext) -> Parity {
        self.0
    }
}

/// Unrecognized names fall back to the random strategy.
pub fn strategy_from_name(name: &str) -> Arc<dyn Strategy> {
    match name.trim().to_ascii_lowercase().as_str() {
        "even" => Arc::new(FixedStrategy(Parity::Even)),
        "odd" => Arc::new(FixedStrategy(Parity::Odd)),
        _ => Arc::new(RandomStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ChoiceContext {
        ChoiceContext {
            match_id: "lg_R1_M001".to_string(),
            opponent_id: "P02".to_string(),
            round_id: 1,
        }
    }

    #[test]
    fn random_strategy_uses_both_symbols() {
        let strategy = RandomStrategy;
        let mut seen_even = false;
        let mut seen_odd = false;
        for _ in 0..64 {
            match strategy.choose(&ctx()) {
                Parity::Even => seen_even = true,
                Parity::Odd => seen_odd = true,
            }
        }
        assert!(seen_even && seen_odd, "64 flips should hit both symbols");
    }

    #[test]
    fn fixed_strategy_never_wavers() {
        let strategy = FixedStrategy(Parity::Odd);
        for _ in 0..8 {
            assert_eq!(strategy.choose(&ctx()), Parity::Odd);
        }
    }

    #[test]
    fn names_resolve_with_random_fallback() {
        assert_eq!(strategy_from_name("even").choose(&ctx()), Parity::Even);
        assert_eq!(strategy_from_name("ODD").choose(&ctx()), Parity::Odd);
        assert_eq!(strategy_from_name("random").name(), "random");
        assert_eq!(strategy_from_name("martingale").name(), "random");
    }
}
