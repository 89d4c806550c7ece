//! The seam simulation code makes its decisions through.
//!
//! [`Session`] answers with a driver behind it; [`LocalChooser`] answers
//! alone, which lets the same simulation run when no driver launched it.

use tracing::debug;

use crate::error::{Result, SessionError};
use crate::prng::Prng;
use crate::protocol::{Response, Step};
use crate::sampler::{self, DEFAULT_TEMPERATURE};
use crate::session::Session;
use crate::transport::Transport;

pub trait Chooser {
    fn select(
        &mut self,
        limit: usize,
        weights: Option<&[f64]>,
        temperature: f64,
    ) -> Result<usize>;

    fn supply_outcome(&mut self, score: i64) -> Result<()>;

    fn select_uniform(&mut self, limit: usize) -> Result<usize> {
        self.select(limit, None, DEFAULT_TEMPERATURE)
    }

    fn select_weighted(
        &mut self,
        limit: usize,
        weights: &[f64],
        temperature: f64,
    ) -> Result<usize> {
        self.select(limit, Some(weights), temperature)
    }
}

impl<T: Transport> Chooser for Session<T> {
    fn select(
        &mut self,
        limit: usize,
        weights: Option<&[f64]>,
        temperature: f64,
    ) -> Result<usize> {
        Session::select(self, limit, weights, temperature)
    }

    fn supply_outcome(&mut self, score: i64) -> Result<()> {
        Session::supply_outcome(self, score)
    }
}

/// Driverless chooser: always samples, never replays.
#[derive(Debug, Clone)]
pub struct LocalChooser {
    rng: Prng,
    path: Option<Vec<Step>>,
    last_outcome: Option<Response>,
    episodes_completed: u64,
}

impl LocalChooser {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Prng::new(seed),
            path: None,
            last_outcome: None,
            episodes_completed: 0,
        }
    }

    /// Same sampling stream a [`Session`] with this nonce would use.
    pub fn from_nonce(nonce: &str) -> Self {
        Self {
            rng: Prng::from_nonce(nonce),
            ..Self::new(1)
        }
    }

    pub fn path(&self) -> &[Step] {
        self.path.as_deref().unwrap_or(&[])
    }

    /// The most recently finished episode.
    pub fn last_outcome(&self) -> Option<&Response> {
        self.last_outcome.as_ref()
    }

    pub fn episodes_completed(&self) -> u64 {
        self.episodes_completed
    }
}

impl Chooser for LocalChooser {
    fn select(
        &mut self,
        limit: usize,
        weights: Option<&[f64]>,
        temperature: f64,
    ) -> Result<usize> {
        let chosen = sampler::sample(&mut self.rng, limit, weights, temperature)?;
        let step = Step::new(chosen, limit).ok_or_else(|| {
            SessionError::InvalidArgument(format!("sampler chose {chosen} out of {limit}"))
        })?;
        self.path.get_or_insert_with(Vec::new).push(step);
        Ok(chosen)
    }

    fn supply_outcome(&mut self, score: i64) -> Result<()> {
        let path = self.path.take().ok_or(SessionError::NoActiveEpisode)?;
        self.episodes_completed += 1;
        debug!(
            "Local episode {} finished: {} steps, score {}",
            self.episodes_completed,
            path.len(),
            score
        );
        self.last_outcome = Some(Response { path, score });
        Ok(())
    }
}
