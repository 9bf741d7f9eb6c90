use serde::Serialize;

use crate::atbat::{AtBatRecord, LineupSlot, ValidationError};
use crate::scoring;

/// Current derived game position: which inning, how many outs, and who
/// bats next.
///
/// Never authoritative storage. It is recomputed from `(events,
/// lineup)` on every change and after every cold start, so two devices
/// replaying the same log always agree. Only `compute` constructs this
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InGameState {
    inning: u32,
    outs: u8,
    batter_index: usize,
    batter_player_id: String,
}

impl InGameState {
    /// Current inning, starting at 1.
    pub fn inning(&self) -> u32 {
        self.inning
    }

    /// Outs in the current inning, always 0..=2.
    pub fn outs(&self) -> u8 {
        self.outs
    }

    /// Index into the batting-order-sorted lineup of the batter due up.
    pub fn batter_index(&self) -> usize {
        self.batter_index
    }

    pub fn batter_player_id(&self) -> &str {
        &self.batter_player_id
    }
}

/// Replays the ordered at-bat log against the lineup and returns the
/// current game position.
///
/// Deterministic fold: events are ordered by `(createdAt, seq)` — the
/// locally assigned sequence number breaks clock-resolution ties — and
/// every at-bat advances the batter index regardless of outcome.
/// Accumulated outs roll over into the next inning at 3.
pub fn compute(
    events: &[AtBatRecord],
    lineup: &[LineupSlot],
) -> Result<InGameState, ValidationError> {
    if lineup.is_empty() {
        return Err(ValidationError::EmptyLineup);
    }

    let mut batting_order: Vec<&LineupSlot> = lineup.iter().collect();
    batting_order.sort_by_key(|slot| slot.batting_order);

    let mut ordered: Vec<&AtBatRecord> = events.iter().collect();
    ordered.sort_by_key(|event| event.replay_key());

    let mut inning: u32 = 1;
    let mut outs: u8 = 0;
    let mut batter_index: usize = 0;

    for event in ordered {
        outs += scoring::out_count(&event.result);
        while outs >= 3 {
            inning += 1;
            outs -= 3;
        }
        // Every recorded at-bat advances the batter, outs and hits
        // alike. Courtesy-runner style exceptions are out of scope.
        batter_index = (batter_index + 1) % batting_order.len();
    }

    Ok(InGameState {
        inning,
        outs,
        batter_index,
        batter_player_id: batting_order[batter_index].player_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    fn lineup(players: &[&str]) -> Vec<LineupSlot> {
        players
            .iter()
            .enumerate()
            .map(|(i, id)| LineupSlot {
                player_id: id.to_string(),
                batting_order: (i + 1) as u32,
            })
            .collect()
    }

    fn event(result: &str, offset_secs: i64, seq: u64) -> AtBatRecord {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
            + Duration::seconds(offset_secs);
        AtBatRecord {
            at_bat_id: format!("ab-{seq}"),
            game_id: "game-1".to_string(),
            player_id: "p1".to_string(),
            team_id: "team-1".to_string(),
            result: result.to_string(),
            inning: 1,
            outs: 0,
            batting_order: None,
            hit_location: None,
            hit_type: None,
            rbis: None,
            created_at: created,
            updated_at: created,
            seq,
        }
    }

    fn events(results: &[&str]) -> Vec<AtBatRecord> {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| event(r, i as i64, i as u64))
            .collect()
    }

    #[test]
    fn empty_lineup_is_a_validation_error() {
        assert_eq!(
            compute(&events(&["K"]), &[]),
            Err(ValidationError::EmptyLineup)
        );
        assert_eq!(compute(&[], &[]), Err(ValidationError::EmptyLineup));
    }

    #[test]
    fn no_events_means_top_of_the_first() {
        let state = compute(&[], &lineup(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(state.inning(), 1);
        assert_eq!(state.outs(), 0);
        assert_eq!(state.batter_index(), 0);
        assert_eq!(state.batter_player_id(), "p1");
    }

    #[test]
    fn strikeout_single_groundout_scenario() {
        // K, 1B, GO: two outs, still inning 1, back to the top of the
        // three-player order.
        let state = compute(&events(&["K", "1B", "GO"]), &lineup(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(state.inning(), 1);
        assert_eq!(state.outs(), 2);
        assert_eq!(state.batter_index(), 0);
        assert_eq!(state.batter_player_id(), "p1");
    }

    #[test]
    fn double_play_adds_two_outs() {
        let state = compute(&events(&["DP"]), &lineup(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(state.inning(), 1);
        assert_eq!(state.outs(), 2);
        assert_eq!(state.batter_index(), 1);
    }

    #[test]
    fn triple_play_rolls_into_next_inning() {
        let state = compute(&events(&["TP"]), &lineup(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(state.inning(), 2);
        assert_eq!(state.outs(), 0);
        assert_eq!(state.batter_index(), 1);
    }

    #[test]
    fn outs_never_exceed_two_in_returned_state() {
        let results = ["K", "GO", "FO", "DP", "TP", "1B", "PO", "LO4", "SAC"];
        for n in 0..results.len() {
            let state = compute(&events(&results[..n]), &lineup(&["p1", "p2"])).unwrap();
            assert!(state.outs() <= 2, "outs overflowed after {n} events");
            assert!(state.inning() >= 1);
        }
    }

    #[rstest]
    #[case(&["1B", "BB", "HR"], 3)]
    #[case(&["K", "K", "K", "K"], 4)]
    #[case(&["1B", "K", "2B", "GO", "HBP"], 5)]
    fn batter_index_is_event_count_mod_lineup_size(#[case] results: &[&str], #[case] n: usize) {
        for lineup_size in 1..=4usize {
            let players: Vec<String> = (0..lineup_size).map(|i| format!("p{i}")).collect();
            let refs: Vec<&str> = players.iter().map(String::as_str).collect();
            let state = compute(&events(results), &lineup(&refs)).unwrap();
            assert_eq!(state.batter_index(), n % lineup_size);
        }
    }

    #[test]
    fn replay_is_pure_and_order_insensitive_to_input_permutation() {
        let lineup = lineup(&["p1", "p2", "p3", "p4"]);
        let mut log = events(&["K", "1B", "DP", "BB", "GO", "HR", "TP"]);

        let expected = compute(&log, &lineup).unwrap();
        log.reverse();
        let replayed = compute(&log, &lineup).unwrap();

        assert_eq!(expected, replayed);
    }

    #[test]
    fn equal_timestamps_fall_back_to_sequence_order() {
        let lineup = lineup(&["p1", "p2", "p3"]);
        // Same created_at; seq decides. TP first would end inning 1
        // immediately; seq order says K then TP.
        let log = vec![event("TP", 0, 1), event("K", 0, 0)];

        let state = compute(&log, &lineup).unwrap();
        assert_eq!(state.inning(), 2);
        assert_eq!(state.outs(), 1);
        assert_eq!(state.batter_index(), 2);
    }

    #[test]
    fn lineup_order_follows_batting_order_not_list_order() {
        let lineup = vec![
            LineupSlot {
                player_id: "cleanup".to_string(),
                batting_order: 4,
            },
            LineupSlot {
                player_id: "leadoff".to_string(),
                batting_order: 1,
            },
            LineupSlot {
                player_id: "second".to_string(),
                batting_order: 2,
            },
            LineupSlot {
                player_id: "third".to_string(),
                batting_order: 3,
            },
        ];

        let state = compute(&events(&["K"]), &lineup).unwrap();
        assert_eq!(state.batter_index(), 1);
        assert_eq!(state.batter_player_id(), "second");
    }
}
