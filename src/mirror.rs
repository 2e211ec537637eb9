//! Replace a local key range with the contents of a remote store.
//!
//! Mirroring composes the batch primitives and adds no atomicity of its own.
//! A run that stops midway leaves the local store somewhere between the old
//! and the new snapshot; callers retry the whole run.

use std::fmt;

use tracing::info;

use crate::config::Remote;
use crate::engine::BatchEngine;
use crate::error::KVError;
use crate::outcome::BatchOutcome;
use crate::selector::{List, Selector};
use crate::traits::{Consistency, Entry, KVStore};

/// Progress of a mirror run, reported through tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    Idle,
    Deleting,
    FetchingRemote,
    WritingLocal,
    Done,
    PartialFailure,
}

impl fmt::Display for MirrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MirrorPhase::Idle => "idle",
            MirrorPhase::Deleting => "deleting",
            MirrorPhase::FetchingRemote => "fetching-remote",
            MirrorPhase::WritingLocal => "writing-local",
            MirrorPhase::Done => "done",
            MirrorPhase::PartialFailure => "partial-failure",
        };
        f.write_str(name)
    }
}

struct MirrorRun<'a> {
    remote: &'a Remote,
    phase: MirrorPhase,
}

impl MirrorRun<'_> {
    fn enter(&mut self, phase: MirrorPhase) {
        info!(
            "Mirror {}: {} -> {}",
            self.remote.url, self.phase, phase
        );
        self.phase = phase;
    }
}

impl BatchEngine {
    /// Replace local data with the remote store's.
    ///
    /// With selectors, only the matching local keys are deleted and only the
    /// matching remote entries copied; keys outside them are untouched. Without
    /// selectors the whole local store is wiped and the whole remote copied.
    ///
    /// Remote reads use eventual consistency. Failed deletes and failed writes
    /// are merged into the returned outcome; listing and connect errors abort
    /// the run with `Err`.
    pub fn mirror_from_remote(
        &self,
        remote: &Remote,
        selectors: Option<&[Selector]>,
    ) -> Result<BatchOutcome, KVError> {
        let mut run = MirrorRun {
            remote,
            phase: MirrorPhase::Idle,
        };
        let all = [Selector::all()];
        let selectors = match selectors {
            Some(selectors) => selectors,
            None => &all[..],
        };
        for selector in selectors {
            selector.key_range()?;
        }

        run.enter(MirrorPhase::Deleting);
        let mut outcome = BatchOutcome::new();
        for selector in selectors {
            outcome.merge(self.batch_delete(selector.clone())?);
        }

        run.enter(MirrorPhase::FetchingRemote);
        let source = self.connector().connect(remote)?;
        let mut working_set: Vec<Entry> = Vec::new();
        for selector in selectors {
            fetch_eventual(
                source.as_ref(),
                selector,
                self.config().list_page_size,
                &mut working_set,
            )?;
        }
        info!(
            "Mirror {}: fetched {} entries",
            remote.url,
            working_set.len()
        );

        run.enter(MirrorPhase::WritingLocal);
        outcome.merge(self.batch_write(working_set));

        if outcome.ok {
            run.enter(MirrorPhase::Done);
        } else {
            run.enter(MirrorPhase::PartialFailure);
        }
        Ok(outcome)
    }
}

fn fetch_eventual(
    source: &dyn KVStore,
    selector: &Selector,
    page_size: usize,
    working_set: &mut Vec<Entry>,
) -> Result<(), KVError> {
    match selector.key_range()? {
        Some(range) => {
            for entry in List::new(source, range, page_size, Consistency::Eventual) {
                working_set.push(entry?);
            }
        }
        None => {
            if let Selector::Keys(keys) = selector {
                for key in keys {
                    if let Some(value) = source.get_with(key, Consistency::Eventual)? {
                        working_set.push((key.clone(), value));
                    }
                }
            }
        }
    }
    Ok(())
}
