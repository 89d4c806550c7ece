//! Agent-side protocol session.
//!
//! One session serves one driver connection. Each episode begins lazily:
//! the first [`Session::select`] after an episode boundary reads a
//! [`Request`](crate::protocol::Request) whose prefix is replayed step by
//! step. Once the prefix is used up the session samples on its own.
//! [`Session::supply_outcome`] reports the full path with a score and closes
//! the episode.
//!
//! ```no_run
//! use monstercarlo::session::Session;
//!
//! let mut session = Session::connect("127.0.0.1", 50123, "nonce")?;
//! loop {
//!     let first = match session.select_uniform(3) {
//!         Ok(i) => i,
//!         Err(e) if e.is_episode_finished() => break,
//!         Err(e) => return Err(e),
//!     };
//!     let second = session.select_weighted(2, &[0.5, 1.5], 0.7)?;
//!     session.supply_outcome((first + second) as i64)?;
//! }
//! # Ok::<(), monstercarlo::error::SessionError>(())
//! ```

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::{Result, SessionError};
use crate::prng::Prng;
use crate::protocol::{self, Response, Step};
use crate::sampler::{self, DEFAULT_TEMPERATURE};
use crate::transport::{TcpTransport, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake done; no episode in progress.
    Connected,
    /// An episode is in progress and the driver's prefix is not yet used up.
    Replaying,
    /// An episode is in progress and choices are sampled locally.
    Sampling,
    /// The driver closed the stream.
    Terminated,
}

#[derive(Debug)]
struct Episode {
    prefix: VecDeque<Step>,
    path: Vec<Step>,
}

#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    nonce: String,
    rng: Prng,
    episode: Option<Episode>,
    terminated: bool,
    episodes_completed: u64,
}

impl Session<TcpTransport> {
    /// Connects to the driver, sends the nonce and seeds sampling from it.
    pub fn connect(address: &str, port: u16, nonce: &str) -> Result<Self> {
        Self::connect_with(&DriverConfig::new(address, port, nonce))
    }

    pub fn connect_with(config: &DriverConfig) -> Result<Self> {
        let connection_error = |source| SessionError::Connection {
            address: format!("{}:{}", config.address, config.port),
            source,
        };
        let transport = TcpTransport::connect(&config.address, config.port, config.io_timeout)
            .map_err(connection_error)?;
        let session = Self::handshake(transport, &config.nonce).map_err(|e| match e {
            SessionError::Io(source) => connection_error(source),
            other => other,
        })?;
        info!("Connected to driver at {}:{}", config.address, config.port);
        Ok(session)
    }
}

impl<T: Transport> Session<T> {
    /// Performs the handshake over an already-open transport.
    pub fn handshake(mut transport: T, nonce: &str) -> Result<Self> {
        if nonce.contains('\n') || nonce.contains('\r') {
            return Err(SessionError::InvalidArgument(
                "nonce must fit on one line".to_string(),
            ));
        }
        transport.write_line(nonce)?;
        Ok(Self {
            transport,
            nonce: nonce.to_string(),
            rng: Prng::from_nonce(nonce),
            episode: None,
            terminated: false,
            episodes_completed: 0,
        })
    }

    /// Picks one of `limit` alternatives.
    ///
    /// Replays the driver's next prefix step if one is pending, otherwise
    /// samples: softmax over `weights / temperature` when weights are given,
    /// uniform when they are not. Returns [`SessionError::EpisodeFinished`]
    /// once the driver has closed the stream.
    pub fn select(
        &mut self,
        limit: usize,
        weights: Option<&[f64]>,
        temperature: f64,
    ) -> Result<usize> {
        sampler::validate(limit, weights, temperature)?;
        if self.terminated {
            return Err(SessionError::EpisodeFinished);
        }
        if self.episode.is_none() {
            self.begin_episode()?;
        }
        let Some(episode) = self.episode.as_mut() else {
            return Err(SessionError::NoActiveEpisode);
        };

        let step = match episode.prefix.front().copied() {
            Some(forced) => {
                if forced.choice_count() != limit {
                    warn!(
                        "Replay diverged at step {}: driver recorded {} choices, simulation offers {}",
                        episode.path.len(),
                        forced.choice_count(),
                        limit
                    );
                    return Err(SessionError::ProtocolViolation {
                        expected: limit,
                        found: forced.choice_count(),
                    });
                }
                episode.prefix.pop_front();
                debug!(
                    "step {}: replayed {} of {}",
                    episode.path.len(),
                    forced.chosen_index(),
                    limit
                );
                forced
            }
            None => {
                let chosen = sampler::sample(&mut self.rng, limit, weights, temperature)?;
                debug!(
                    "step {}: sampled {} of {}",
                    episode.path.len(),
                    chosen,
                    limit
                );
                Step::new(chosen, limit).ok_or_else(|| {
                    SessionError::InvalidArgument(format!(
                        "sampler chose {chosen} out of {limit}"
                    ))
                })?
            }
        };

        episode.path.push(step);
        Ok(step.chosen_index())
    }

    pub fn select_uniform(&mut self, limit: usize) -> Result<usize> {
        self.select(limit, None, DEFAULT_TEMPERATURE)
    }

    pub fn select_weighted(
        &mut self,
        limit: usize,
        weights: &[f64],
        temperature: f64,
    ) -> Result<usize> {
        self.select(limit, Some(weights), temperature)
    }

    /// Reports the episode's path and score to the driver and closes the episode.
    ///
    /// If the write fails the episode stays open, so [`Session::path`] still
    /// shows what was being reported.
    pub fn supply_outcome(&mut self, score: i64) -> Result<()> {
        let Some(episode) = self.episode.as_ref() else {
            return Err(SessionError::NoActiveEpisode);
        };
        let steps = episode.path.len();
        let line = protocol::encode_response(&Response {
            path: episode.path.clone(),
            score,
        })?;
        self.transport.write_line(&line)?;
        self.episode = None;
        self.episodes_completed += 1;
        info!(
            "Episode {} finished: {} steps, score {}",
            self.episodes_completed, steps, score
        );
        Ok(())
    }

    fn begin_episode(&mut self) -> Result<()> {
        let Some(line) = self.transport.read_line()? else {
            info!(
                "Driver closed the stream after {} episodes",
                self.episodes_completed
            );
            self.terminated = true;
            return Err(SessionError::EpisodeFinished);
        };
        let request = protocol::decode_request_bytes(&line)?;
        info!(
            "Episode {} started with a {}-step prefix",
            self.episodes_completed + 1,
            request.prefix.len()
        );
        self.episode = Some(Episode {
            prefix: request.prefix.into(),
            path: Vec::new(),
        });
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        match &self.episode {
            _ if self.terminated => SessionState::Terminated,
            None => SessionState::Connected,
            Some(e) if e.prefix.is_empty() => SessionState::Sampling,
            Some(_) => SessionState::Replaying,
        }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn is_episode_active(&self) -> bool {
        self.episode.is_some()
    }

    /// Prefix steps still waiting to be replayed in the current episode.
    pub fn replay_remaining(&self) -> usize {
        self.episode.as_ref().map_or(0, |e| e.prefix.len())
    }

    /// Steps recorded so far in the current episode.
    pub fn path(&self) -> &[Step] {
        self.episode
            .as_ref()
            .map(|e| e.path.as_slice())
            .unwrap_or(&[])
    }

    pub fn episodes_completed(&self) -> u64 {
        self.episodes_completed
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_response, encode_request, Request};
    use crate::transport::LineTransport;
    use std::io::{self, BufRead, BufReader, Cursor, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    type MemSession = Session<LineTransport<Cursor<Vec<u8>>, Vec<u8>>>;

    fn step(a: usize, c: usize) -> Step {
        Step::new(a, c).unwrap()
    }

    fn session_with(driver_lines: &[&str], nonce: &str) -> MemSession {
        let mut input = String::new();
        for l in driver_lines {
            input.push_str(l);
            input.push('\n');
        }
        let transport = LineTransport::new(Cursor::new(input.into_bytes()), Vec::new());
        Session::handshake(transport, nonce).unwrap()
    }

    fn written_lines(session: MemSession) -> Vec<String> {
        let (_, out) = session.into_transport().into_parts();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn handshake_sends_nonce_first() {
        let s = session_with(&[], "abc-123");
        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(written_lines(s), vec!["abc-123"]);
    }

    #[test]
    fn multi_line_nonce_is_rejected() {
        let transport = LineTransport::new(Cursor::new(Vec::new()), Vec::new());
        let err = Session::handshake(transport, "a\nb").unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
    }

    #[test]
    fn sampled_step_is_reported_with_score() {
        let mut s = session_with(&[r#"{"prefix":[]}"#], "scenario");
        let a0 = s.select_uniform(3).unwrap();
        assert!(a0 < 3);
        assert_eq!(s.state(), SessionState::Sampling);
        s.supply_outcome(5).unwrap();
        assert_eq!(s.state(), SessionState::Connected);

        let lines = written_lines(s);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            format!(r#"{{"path":[{{"a":{a0},"c":3}}],"score":5}}"#)
        );
    }

    #[test]
    fn prefix_is_forced_then_sampling_resumes() {
        let mut s = session_with(&[r#"{"prefix":[{"a":1,"c":2}]}"#], "n");
        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(s.select_uniform(2).unwrap(), 1);
        assert_eq!(s.replay_remaining(), 0);
        let second = s.select_uniform(2).unwrap();
        assert!(second < 2);
        assert_eq!(s.path(), &[step(1, 2), step(second, 2)]);
    }

    #[test]
    fn forced_choice_ignores_weights() {
        let mut s = session_with(&[r#"{"prefix":[{"a":0,"c":3}]}"#], "n");
        // Weights overwhelmingly favour index 2, but the prefix wins.
        assert_eq!(s.select_weighted(3, &[0.0, 0.0, 1000.0], 0.01).unwrap(), 0);
        assert_eq!(s.select_weighted(3, &[0.0, 0.0, 1000.0], 0.01).unwrap(), 2);
    }

    #[test]
    fn replay_fidelity() {
        let prefix = vec![step(0, 4), step(3, 4), step(1, 2), step(6, 7), step(0, 1)];
        let line = encode_request(&Request {
            prefix: prefix.clone(),
        })
        .unwrap();
        let mut s = session_with(&[&line], "fidelity");
        for p in &prefix {
            assert_eq!(s.state(), SessionState::Replaying);
            assert_eq!(s.select_uniform(p.choice_count()).unwrap(), p.chosen_index());
        }
        s.supply_outcome(42).unwrap();

        let lines = written_lines(s);
        let response = decode_response(&lines[1]).unwrap();
        assert_eq!(response.path, prefix);
        assert_eq!(response.score, 42);
    }

    #[test]
    fn choice_count_mismatch_is_a_violation() {
        let mut s = session_with(&[r#"{"prefix":[{"a":0,"c":4}]}"#], "n");
        let err = s.select_uniform(5).unwrap_err();
        assert!(matches!(
            err,
            SessionError::ProtocolViolation {
                expected: 5,
                found: 4
            }
        ));
        // Nothing was recorded or consumed.
        assert!(s.path().is_empty());
        assert_eq!(s.replay_remaining(), 1);
    }

    #[test]
    fn closed_stream_finishes_the_run() {
        let mut s = session_with(&[], "n");
        let err = s.select_uniform(3).unwrap_err();
        assert!(err.is_episode_finished());
        assert_eq!(s.state(), SessionState::Terminated);
        // Stays finished.
        assert!(s.select_uniform(3).unwrap_err().is_episode_finished());
    }

    #[test]
    fn bad_request_line_is_a_decode_error() {
        let mut s = session_with(&["{\"prefix\": oops"], "n");
        let err = s.select_uniform(2).unwrap_err();
        assert!(matches!(err, SessionError::ProtocolDecode { .. }));
        assert!(!s.is_episode_active());
    }

    #[test]
    fn non_utf8_request_is_a_decode_error() {
        let transport = LineTransport::new(
            Cursor::new(b"{\"prefix\":[{\"a\":0,\"c\":2}]}\xff\n".to_vec()),
            Vec::new(),
        );
        let mut s = Session::handshake(transport, "n").unwrap();
        let err = s.select_uniform(2).unwrap_err();
        assert!(
            matches!(err, SessionError::ProtocolDecode { .. }),
            "{err:?}"
        );
        assert!(!s.is_episode_active());
        assert_eq!(s.state(), SessionState::Connected);
    }

    /// Accepts the nonce line, then refuses every write after it.
    struct HangUpAfterHandshake {
        lines: usize,
    }

    impl Write for HangUpAfterHandshake {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.lines > 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "driver hung up"));
            }
            self.lines += buf.iter().filter(|&&b| b == b'\n').count();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_report_keeps_the_episode() {
        let transport = LineTransport::new(
            Cursor::new(b"{\"prefix\":[{\"a\":1,\"c\":3}]}\n".to_vec()),
            HangUpAfterHandshake { lines: 0 },
        );
        let mut s = Session::handshake(transport, "n").unwrap();
        assert_eq!(s.select_uniform(3).unwrap(), 1);

        let err = s.supply_outcome(4).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe
        ));
        assert!(s.is_episode_active());
        assert_eq!(s.path(), &[step(1, 3)]);
        assert_eq!(s.episodes_completed(), 0);
    }

    #[test]
    fn invalid_arguments_do_not_consume_a_request() {
        let mut s = session_with(&[r#"{"prefix":[{"a":1,"c":2}]}"#], "n");
        assert!(matches!(
            s.select_weighted(2, &[1.0], 1.0),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            s.select_weighted(2, &[1.0, 2.0], 0.0),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(!s.is_episode_active());
        assert_eq!(s.select_uniform(2).unwrap(), 1);
    }

    #[test]
    fn outcome_without_episode_is_rejected() {
        let mut s = session_with(&[], "n");
        assert!(matches!(
            s.supply_outcome(1),
            Err(SessionError::NoActiveEpisode)
        ));
    }

    #[test]
    fn consecutive_episodes_read_fresh_requests() {
        let mut s = session_with(
            &[r#"{"prefix":[{"a":2,"c":3}]}"#, r#"{"prefix":[{"a":0,"c":3}]}"#],
            "n",
        );
        assert_eq!(s.select_uniform(3).unwrap(), 2);
        s.supply_outcome(1).unwrap();
        assert_eq!(s.select_uniform(3).unwrap(), 0);
        s.supply_outcome(2).unwrap();
        assert_eq!(s.episodes_completed(), 2);
        assert!(s.select_uniform(3).unwrap_err().is_episode_finished());

        let lines = written_lines(s);
        assert_eq!(lines[1], r#"{"path":[{"a":2,"c":3}],"score":1}"#);
        assert_eq!(lines[2], r#"{"path":[{"a":0,"c":3}],"score":2}"#);
    }

    #[test]
    fn same_nonce_reproduces_sampled_choices() {
        let run = |nonce: &str| {
            let mut s = session_with(&[r#"{"prefix":[]}"#], nonce);
            (0..50)
                .map(|i| s.select_uniform(2 + i % 5).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run("repeatable"), run("repeatable"));
        assert_ne!(run("repeatable"), run("another nonce"));
    }

    #[test]
    fn drives_a_real_tcp_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let driver = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;

            let mut nonce = String::new();
            reader.read_line(&mut nonce).unwrap();
            assert_eq!(nonce.trim(), "tcp-nonce");

            writer.write_all(b"{\"prefix\":[{\"a\":1,\"c\":3}]}\n").unwrap();
            let mut reply = String::new();
            reader.read_line(&mut reply).unwrap();
            writer.shutdown(std::net::Shutdown::Write).unwrap();
            decode_response(&reply).unwrap()
        });

        let mut s = Session::connect("127.0.0.1", port, "tcp-nonce").unwrap();
        assert_eq!(s.select_uniform(3).unwrap(), 1);
        let sampled = s.select_weighted(4, &[1.0, 2.0, 3.0, 4.0], 1.0).unwrap();
        s.supply_outcome(-7).unwrap();
        assert!(s.select_uniform(3).unwrap_err().is_episode_finished());

        let response = driver.join().unwrap();
        assert_eq!(response.path, vec![step(1, 3), step(sampled, 4)]);
        assert_eq!(response.score, -7);
    }

    #[test]
    fn stalled_driver_times_out_as_io() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let driver = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut nonce = String::new();
            reader.read_line(&mut nonce).unwrap();
            // Hold the connection open without ever sending a request.
            let _ = done_rx.recv();
            nonce
        });

        let cfg = DriverConfig::new("127.0.0.1", port, "slow")
            .with_io_timeout(Duration::from_millis(50));
        let mut s = Session::connect_with(&cfg).unwrap();
        let err = s.select_uniform(2).unwrap_err();
        assert!(
            matches!(
                &err,
                SessionError::Io(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
            ),
            "{err:?}"
        );
        assert!(!err.is_episode_finished());
        assert_eq!(s.state(), SessionState::Connected);

        done_tx.send(()).unwrap();
        assert_eq!(driver.join().unwrap().trim(), "slow");
    }

    #[test]
    fn refused_connection_is_a_connection_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = Session::connect("127.0.0.1", port, "n").unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));
    }
}
