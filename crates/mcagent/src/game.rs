//! Reference simulation for exercising a driver end to end.
//!
//! ─────────────────────────────────────────────────────────────────────────
//! Treasure run: a fixed number of rounds, each offering a row of doors.
//! How many doors a round has depends on the door taken in the round
//! before, so a replayed prefix only lines up when it follows the same
//! route. Every door pays a fixed amount; the worst doors are traps that end
//! the run early. Payoffs are a pure function of the route, so the driver
//! sees a deterministic score for each path.
//! ─────────────────────────────────────────────────────────────────────────

use monstercarlo::chooser::Chooser;
use monstercarlo::error::SessionError;
use monstercarlo::protocol::Step;
use thiserror::Error;

pub const MIN_DOORS: usize = 2;
pub const MAX_DOORS: usize = 5;
pub const TRAP_PAYOFF: i64 = -9;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("unknown experiment variant {0:?} (expected \"uniform\" or \"weighted\")")]
    UnknownVariant(String),
    #[error("temperature must be positive, got {0}")]
    BadTemperature(f64),
}

/// How the agent picks doors the driver leaves open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionPolicy {
    Uniform,
    /// Softmax over the per-door hints.
    Weighted { temperature: f64 },
}

impl SelectionPolicy {
    /// Maps the launcher's design variant onto a policy; no variant means uniform.
    pub fn from_variant(variant: Option<&str>, temperature: f64) -> Result<Self, GameError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(GameError::BadTemperature(temperature));
        }
        match variant.map(str::trim) {
            None | Some("") | Some("uniform") => Ok(SelectionPolicy::Uniform),
            Some("weighted") => Ok(SelectionPolicy::Weighted { temperature }),
            Some(other) => Err(GameError::UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub path: Vec<Step>,
    pub score: i64,
    pub trapped: bool,
}

#[derive(Debug, Clone)]
pub struct TreasureRun {
    pub rounds: usize,
    pub policy: SelectionPolicy,
    layout_seed: u64,
}

impl TreasureRun {
    pub fn new(rounds: usize, layout_seed: u64, policy: SelectionPolicy) -> Self {
        Self {
            rounds: rounds.max(1),
            policy,
            layout_seed,
        }
    }

    /// Number of doors in `round`, given the door taken in the previous round.
    pub fn doors_at(&self, round: usize, previous: Option<usize>) -> usize {
        let h = self.mix(round as u64, previous.map_or(0, |p| p as u64 + 1), 0xD00F);
        MIN_DOORS + (h % (MAX_DOORS - MIN_DOORS + 1) as u64) as usize
    }

    /// Payoff in `TRAP_PAYOFF..=9` for taking `door`.
    pub fn payoff(&self, round: usize, previous: Option<usize>, door: usize) -> i64 {
        let h = self.mix(
            round as u64,
            previous.map_or(0, |p| p as u64 + 1),
            door as u64 + 1,
        );
        (h % 19) as i64 - 9
    }

    /// Imperfect per-door estimates: the true payoff blurred by a fixed offset.
    pub fn hints(&self, round: usize, previous: Option<usize>, doors: usize) -> Vec<f64> {
        (0..doors)
            .map(|door| {
                let blur = self.mix(round as u64, door as u64, 0xB1u64) % 7;
                (self.payoff(round, previous, door) as f64 + blur as f64 - 3.0) / 3.0
            })
            .collect()
    }

    /// Plays one episode through `chooser` and reports the score to it.
    pub fn play_episode<C: Chooser>(&self, chooser: &mut C) -> Result<RunOutcome, SessionError> {
        let mut path = Vec::with_capacity(self.rounds);
        let mut score = 0i64;
        let mut previous = None;
        let mut trapped = false;

        for round in 0..self.rounds {
            let doors = self.doors_at(round, previous);
            let door = match self.policy {
                SelectionPolicy::Uniform => chooser.select_uniform(doors)?,
                SelectionPolicy::Weighted { temperature } => {
                    let hints = self.hints(round, previous, doors);
                    chooser.select_weighted(doors, &hints, temperature)?
                }
            };
            let step = Step::new(door, doors).ok_or_else(|| {
                SessionError::InvalidArgument(format!("chooser picked door {door} of {doors}"))
            })?;
            let payoff = self.payoff(round, previous, door);
            path.push(step);
            score += payoff;
            previous = Some(door);

            if payoff == TRAP_PAYOFF {
                trapped = true;
                break;
            }
        }

        chooser.supply_outcome(score)?;
        Ok(RunOutcome {
            path,
            score,
            trapped,
        })
    }

    fn mix(&self, a: u64, b: u64, c: u64) -> u64 {
        // FNV-1a-ish mixing with extra avalanching.
        #[inline]
        fn mix64(mut h: u64, x: u64) -> u64 {
            h ^= x;
            h = h.wrapping_mul(1099511628211);
            h ^= h >> 33;
            h = h.wrapping_mul(0xff51afd7ed558ccd);
            h ^= h >> 33;
            h
        }

        let mut h = 14695981039346656037u64;
        h = mix64(h, self.layout_seed);
        h = mix64(h, a);
        h = mix64(h, b);
        mix64(h, c)
    }
}
