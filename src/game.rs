use crate::types::*;
use rand::rngs::OsRng;
use rand::Rng;

/// Draw from the OS entropy source. Range is inclusive on both ends.
pub fn draw_number() -> u8 {
    OsRng.gen_range(DRAW_MIN..=DRAW_MAX)
}

/// Score a finished game. Choices arrive in (player A, player B) order and
/// the first matching choice wins, so a same-choice collision always
/// favors player A. When nobody matched the drawn parity the winner is
/// `None` and the coordinator records a tie.
pub fn determine_winner(drawn_number: u8, choices: &[(String, Parity)]) -> GameResult {
    let number_parity = Parity::of_number(drawn_number);
    let winner_player_id = choices
        .iter()
        .find(|(_, choice)| *choice == number_parity)
        .map(|(player_id, _)| player_id.clone());

    let scores = choices
        .iter()
        .map(|(player_id, _)| {
            let points = match &winner_player_id {
                Some(winner) if winner == player_id => WIN_POINTS,
                Some(_) => LOSS_POINTS,
                None => TIE_POINTS,
            };
            (player_id.clone(), points)
        })
        .collect();

    GameResult {
        status: "WIN".to_string(),
        winner_player_id,
        drawn_number,
        number_parity,
        choices: choices.to_vec(),
        scores,
    }
}
