pub mod player_scores;
pub mod players;
pub mod score_events;
