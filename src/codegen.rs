//! Short code generation with collision-driven length escalation
//!
//! Candidates are drawn uniformly from base62 and claimed with an
//! insert-if-absent against storage, so uniqueness is decided by the
//! database constraint and never by an in-process check. The working length
//! starts at the configured minimum and grows by one (up to the configured
//! maximum) when a generation runs out of attempts, or when at least half of
//! the recent attempts collided.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CodeConfig;
use crate::models::{Link, NewLink};
use crate::storage::{Storage, StorageError};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Number of recent attempts considered for collision pressure
const WINDOW: usize = 64;

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("short code is already taken")]
    CodeTaken,
    #[error("could not find a free short code after {0} attempts")]
    CapacityExhausted(usize),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct CodeGenerator {
    current_length: AtomicUsize,
    max_length: usize,
    max_attempts: usize,
    /// `true` for every attempt in the window that collided
    recent: Mutex<VecDeque<bool>>,
}

impl CodeGenerator {
    pub fn new(config: &CodeConfig) -> Self {
        Self {
            current_length: AtomicUsize::new(config.length),
            max_length: config.max_length,
            max_attempts: config.max_attempts,
            recent: Mutex::new(VecDeque::with_capacity(WINDOW)),
        }
    }

    pub fn current_length(&self) -> usize {
        self.current_length.load(Ordering::Relaxed)
    }

    /// A random base62 candidate of the given length.
    pub fn candidate(length: usize) -> String {
        std::iter::repeat_with(|| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
            .take(length)
            .collect()
    }

    /// Insert `draft` under a freshly generated code.
    ///
    /// `draft.short_code` is ignored and replaced by each candidate in turn.
    pub async fn create_unique(&self, storage: &dyn Storage, draft: NewLink) -> Result<Link, CodeError> {
        let mut link = draft;

        for attempt in 1..=self.max_attempts {
            let length = self.current_length();
            link.short_code = Self::candidate(length);

            match storage.insert_link(&link).await {
                Ok(created) => {
                    self.note_attempt(false, length);
                    return Ok(created);
                }
                Err(StorageError::Conflict) => {
                    debug!(attempt, length, "Short code collision, retrying");
                    self.note_attempt(true, length);
                }
                Err(StorageError::Other(e)) => return Err(CodeError::Storage(e)),
            }
        }

        let length = self.current_length();
        warn!(length, attempts = self.max_attempts, "Short code generation exhausted");
        self.escalate_from(length);
        Err(CodeError::CapacityExhausted(self.max_attempts))
    }

    /// Insert `draft` under the caller-chosen code it already carries.
    pub async fn claim_custom(&self, storage: &dyn Storage, draft: &NewLink) -> Result<Link, CodeError> {
        match storage.insert_link(draft).await {
            Ok(created) => Ok(created),
            Err(StorageError::Conflict) => Err(CodeError::CodeTaken),
            Err(StorageError::Other(e)) => Err(CodeError::Storage(e)),
        }
    }

    fn note_attempt(&self, collided: bool, length: usize) {
        let pressured = {
            let mut recent = match self.recent.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if recent.len() == WINDOW {
                recent.pop_front();
            }
            recent.push_back(collided);

            let collisions = recent.iter().filter(|c| **c).count();
            let pressured = recent.len() == WINDOW && collisions * 2 >= WINDOW;
            if pressured {
                recent.clear();
            }
            pressured
        };

        if pressured {
            info!(length, "High collision ratio observed");
            self.escalate_from(length);
        }
    }

    /// Grow the working length by one, unless another task already did or the
    /// maximum is reached.
    fn escalate_from(&self, length: usize) {
        if length >= self.max_length {
            warn!(length, "Short code length already at maximum");
            return;
        }
        if self
            .current_length
            .compare_exchange(length, length + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            info!(from = length, to = length + 1, "Escalated short code length");
        }
    }
}
