use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::engine::{ApplyMode, TournamentEngine};
use crate::export::{build_payload, write_payload};
use crate::persist::{save_store, MonitorStore};
use crate::settings::MonitorSettings;
use crate::shutdown::ShutdownSignal;
use crate::snapshot::SnapshotExtractor;

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("failed to scan log directory '{path}': {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Follows the log directory: replays the backlog, then tails the live file
/// by polling its size, handling rotation, truncation, silence, and the
/// shutdown protocol.
pub struct LogTailer {
    settings: MonitorSettings,
    engine: TournamentEngine,
    extractor: SnapshotExtractor,
    shutdown: ShutdownSignal,
    current: Option<PathBuf>,
    offset: u64,
    last_growth: Instant,
    last_inactivity_warn: Option<Instant>,
    carry_warned: bool,
    persisted_matches: usize,
}

impl LogTailer {
    pub fn new(
        settings: MonitorSettings,
        engine: TournamentEngine,
        shutdown: ShutdownSignal,
    ) -> Self {
        let persisted_matches = engine.history().len();
        Self {
            settings,
            engine,
            shutdown,
            extractor: SnapshotExtractor::new(),
            current: None,
            offset: 0,
            last_growth: Instant::now(),
            last_inactivity_warn: None,
            carry_warned: false,
            persisted_matches,
        }
    }

    pub fn engine(&self) -> &TournamentEngine {
        &self.engine
    }

    /// Backlog catch-up, then the live tail loop. Returns when a stop was
    /// requested and the shutdown sequence completed.
    pub async fn run(mut self) -> Result<(), TailError> {
        self.catch_up().await?;

        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);
        let export_interval = Duration::from_millis(self.settings.export_interval_ms);
        self.export_now();
        let mut last_export = Instant::now();

        loop {
            if self.shutdown.stop_requested() {
                self.finish("shutdown");
                return Ok(());
            }
            if self.shutdown.take_finalize_request() {
                self.finish("operator request");
                self.drain().await;
                return Ok(());
            }

            self.poll_once();

            if last_export.elapsed() >= export_interval {
                self.export_now();
                last_export = Instant::now();
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Replays every backlog file in sorted order, then decides whether the
    /// newest file is being written to right now. A growing file of real
    /// size becomes the live tail; anything else is just more backlog.
    async fn catch_up(&mut self) -> Result<(), TailError> {
        let files = self.list_log_files()?;
        let Some((candidate, backlog)) = files.split_last() else {
            tracing::info!(
                path = %self.settings.log_dir.display(),
                "no log files yet, waiting"
            );
            return Ok(());
        };

        for path in backlog {
            self.replay_backlog_file(path);
        }

        let first_size = file_size(candidate);
        tokio::time::sleep(Duration::from_millis(self.settings.growth_probe_ms)).await;
        let second_size = file_size(candidate);

        if second_size > first_size && second_size >= self.settings.live_file_min_bytes {
            tracing::info!(path = %candidate.display(), "log file is live, tailing");
            let contents = read_range(candidate, 0, second_size);
            for snapshot in self.extractor.extend(&contents) {
                self.engine.apply_snapshot(&snapshot, ApplyMode::FullReplay);
            }
            self.current = Some(candidate.clone());
            self.offset = second_size;
        } else {
            // Still the tail position: the newest file may start growing
            // again, and adopting it here keeps the poll loop from reading
            // it a second time from the start.
            let replayed = self.replay_backlog_file(candidate);
            self.current = Some(candidate.clone());
            self.offset = replayed;
        }
        self.last_growth = Instant::now();

        tracing::info!(
            files = files.len(),
            history = self.engine.history().len(),
            "catch-up complete"
        );
        self.persist_if_new_matches();
        Ok(())
    }

    /// Replays one whole file and returns how many bytes of it were read.
    fn replay_backlog_file(&mut self, path: &Path) -> u64 {
        tracing::info!(path = %path.display(), "replaying backlog file");
        let (contents, length) = match std::fs::read(path) {
            Ok(bytes) => {
                let length = bytes.len() as u64;
                (String::from_utf8_lossy(&bytes).into_owned(), length)
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "skipping unreadable backlog file"
                );
                return 0;
            }
        };

        for snapshot in self.extractor.extend(&contents) {
            self.engine.apply_snapshot(&snapshot, ApplyMode::FullReplay);
        }
        if let Some(snapshot) = self.extractor.flush() {
            self.engine.apply_snapshot(&snapshot, ApplyMode::FullReplay);
        }
        self.engine.finalize_if_eliminable("file boundary");
        length
    }

    /// One tail iteration: rotation check, size delta, inactivity handling.
    /// Everything in here tolerates I/O failure; a failed read is treated
    /// as "no growth this round".
    fn poll_once(&mut self) {
        self.check_rotation();

        let Some(path) = self.current.clone() else {
            return;
        };

        let size = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %error,
                    "size check failed, treating as no growth"
                );
                self.check_inactivity();
                return;
            }
        };

        if size > self.offset {
            let delta = read_range(&path, self.offset, size);
            self.offset += delta.len() as u64;
            self.last_growth = Instant::now();
            self.last_inactivity_warn = None;

            for snapshot in self.extractor.extend(&delta) {
                self.engine
                    .apply_snapshot(&snapshot, ApplyMode::Incremental);
                if self.shutdown.stop_requested() {
                    break;
                }
            }
            self.enforce_carry_cap();
        } else if size < self.offset {
            tracing::info!(
                path = %path.display(),
                previous = self.offset,
                current = size,
                "log file shrank, resetting to its start"
            );
            self.offset = 0;
            self.extractor = SnapshotExtractor::new();
        } else {
            self.check_inactivity();
        }

        self.persist_if_new_matches();
    }

    /// Switches to a newer log file when one appears, finalizing whatever
    /// the previous file left behind. Also picks up the first file when the
    /// directory started empty. A failed directory scan is treated as
    /// "nothing changed"; the next poll retries it.
    fn check_rotation(&mut self) {
        let files = match self.list_log_files() {
            Ok(files) => files,
            Err(error) => {
                tracing::warn!(error = %error, "log directory scan failed, will retry");
                return;
            }
        };
        let Some(newest) = files.last() else {
            return;
        };

        let is_newer = match &self.current {
            Some(current) => newest > current,
            None => true,
        };
        if !is_newer {
            return;
        }

        if self.current.is_some() {
            tracing::info!(path = %newest.display(), "newer log file, rotating");
            if let Some(snapshot) = self.extractor.flush() {
                self.engine
                    .apply_snapshot(&snapshot, ApplyMode::Incremental);
            }
            self.engine.finalize_if_eliminable("log rotation");
        } else {
            tracing::info!(path = %newest.display(), "log file appeared, tailing");
        }

        self.current = Some(newest.clone());
        self.offset = 0;
        self.extractor = SnapshotExtractor::new();
        self.last_growth = Instant::now();
        self.carry_warned = false;
    }

    /// A live match with a silent log: a lone surviving team gets the match
    /// force-finalized; anything more ambiguous only warrants a warning.
    fn check_inactivity(&mut self) {
        let timeout = Duration::from_secs(self.settings.inactivity_timeout_secs);
        if self.last_growth.elapsed() < timeout {
            return;
        }
        if self.engine.match_state().id.is_none() {
            return;
        }

        if self.engine.can_finalize_safely() {
            tracing::warn!(
                idle_secs = self.last_growth.elapsed().as_secs(),
                "no log activity, force-finalizing the live match"
            );
            self.engine.finalize_active_match("inactivity timeout");
            self.persist_now();
            self.export_now();
        } else {
            let should_warn = self
                .last_inactivity_warn
                .map(|warned| warned.elapsed() >= timeout)
                .unwrap_or(true);
            if should_warn {
                tracing::warn!(
                    idle_secs = self.last_growth.elapsed().as_secs(),
                    alive_teams = self.engine.match_state().teams_with_live_members().len(),
                    "no log activity but several teams alive, leaving the match open"
                );
                self.last_inactivity_warn = Some(Instant::now());
            }
        }
    }

    /// A stream that never produces a boundary would otherwise grow the
    /// carry without limit. Past the cap the carry is flushed and applied
    /// as one degraded snapshot.
    fn enforce_carry_cap(&mut self) {
        let carry = self.extractor.carry_len();
        if carry <= self.settings.carry_warn_bytes {
            self.carry_warned = false;
            return;
        }
        if !self.carry_warned {
            tracing::warn!(
                carry_bytes = carry,
                "no snapshot boundary in a long stretch of log, force-flushing"
            );
            self.carry_warned = true;
        }
        if let Some(snapshot) = self.extractor.flush() {
            self.engine
                .apply_snapshot(&snapshot, ApplyMode::Incremental);
        }
    }

    /// The orderly wind-down: flush the carry, finalize only with a clear
    /// outcome, persist, export.
    fn finish(&mut self, reason: &str) {
        if let Some(snapshot) = self.extractor.flush() {
            self.engine
                .apply_snapshot(&snapshot, ApplyMode::Incremental);
        }

        if self.engine.match_state().id.is_some() {
            if self.engine.can_finalize_safely() {
                self.engine.finalize_active_match(reason);
            } else {
                tracing::warn!(
                    match_id = self.engine.match_state().id.as_deref().unwrap_or(""),
                    "live match has no clear outcome, leaving it unscored"
                );
            }
        }

        self.persist_now();
        self.export_now();
        tracing::info!(reason, "tail loop finished");
    }

    /// Post-finalize drain: the scoreboard keeps refreshing on a slow timer
    /// until the operator asks for a full stop.
    async fn drain(&mut self) {
        tracing::info!("entering drain mode, exports continue on a slow timer");
        let drain_interval = Duration::from_millis(self.settings.drain_export_interval_ms);
        let mut last_export = Instant::now();

        while !self.shutdown.stop_requested() {
            if last_export.elapsed() >= drain_interval {
                self.export_now();
                last_export = Instant::now();
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        self.export_now();
    }

    fn list_log_files(&self) -> Result<Vec<PathBuf>, TailError> {
        let entries =
            std::fs::read_dir(&self.settings.log_dir).map_err(|source| TailError::Scan {
                path: self.settings.log_dir.clone(),
                source,
            })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|extension| extension == "txt")
                        .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn export_now(&mut self) {
        let payload = build_payload(&self.engine);
        if let Err(error) = write_payload(&self.settings.output_json, &payload) {
            tracing::warn!(
                path = %self.settings.output_json.display(),
                error = %error,
                "export failed, previous file stays in place"
            );
        }
    }

    fn persist_now(&mut self) {
        let store = MonitorStore::from_engine(&self.engine);
        match save_store(&self.settings.store_path, &store) {
            Ok(()) => self.persisted_matches = store.match_history.len(),
            Err(error) => tracing::warn!(
                path = %self.settings.store_path.display(),
                error = %error,
                "store save failed"
            ),
        }
    }

    /// Every finalization reaches the store: whenever the history has grown
    /// past what was last saved, save again. A failed save leaves the
    /// watermark behind so the next round retries.
    fn persist_if_new_matches(&mut self) {
        if self.engine.history().len() > self.persisted_matches {
            self.persist_now();
        }
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|metadata| metadata.len()).unwrap_or(0)
}

/// Reads `[offset, end)` of a file, lossily decoded; the log writer ignores
/// encoding errors, so do we.
fn read_range(path: &Path, offset: u64, end: u64) -> String {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(error) => {
            tracing::debug!(path = %path.display(), error = %error, "open failed");
            return String::new();
        }
    };
    if file.seek(SeekFrom::Start(offset)).is_err() {
        return String::new();
    }

    let mut bytes = Vec::with_capacity(end.saturating_sub(offset) as usize);
    if let Err(error) = file
        .take(end.saturating_sub(offset))
        .read_to_end(&mut bytes)
    {
        tracing::debug!(path = %path.display(), error = %error, "read failed");
        return String::new();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
