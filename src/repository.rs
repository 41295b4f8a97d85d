use std::collections::BTreeSet;
use std::fmt;

use log::debug;

use crate::dataset::{SharedTrackDataset, TrackDataset};
use crate::error::Error;
use crate::math::RelativeOffset;
use crate::section::Section;
use crate::track::{Track, TrackId};

/// Membership change of a repository, sent once per mutating call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRepositoryEvent {
    pub added: BTreeSet<TrackId>,
    pub removed: BTreeSet<TrackId>,
}

impl TrackRepositoryEvent {
    pub fn new(added: BTreeSet<TrackId>, removed: BTreeSet<TrackId>) -> Self {
        Self { added, removed }
    }

    pub fn create_added(added: BTreeSet<TrackId>) -> Self {
        Self::new(added, BTreeSet::new())
    }

    pub fn create_removed(removed: BTreeSet<TrackId>) -> Self {
        Self::new(BTreeSet::new(), removed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub trait TrackRepositoryObserver: Send {
    fn notify_tracks(&self, event: &TrackRepositoryEvent);
}

impl<F> TrackRepositoryObserver for F
where
    F: Fn(&TrackRepositoryEvent) + Send,
{
    #[inline]
    fn notify_tracks(&self, event: &TrackRepositoryEvent) {
        self(event)
    }
}

/// Single mutable reference point for the current track dataset.
pub struct TrackRepository<D: TrackDataset = SharedTrackDataset> {
    dataset: D,
    observers: Vec<Box<dyn TrackRepositoryObserver>>,
}

impl TrackRepository<SharedTrackDataset> {
    pub fn new() -> Self {
        Self::with_dataset(SharedTrackDataset::new())
    }
}

impl Default for TrackRepository<SharedTrackDataset> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: TrackDataset> TrackRepository<D> {
    pub fn with_dataset(dataset: D) -> Self {
        Self {
            dataset,
            observers: Vec::new(),
        }
    }

    pub fn register_observer<O: TrackRepositoryObserver + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    #[inline]
    pub fn get_all(&self) -> &D {
        &self.dataset
    }

    #[inline]
    pub fn get_for(&self, id: &TrackId) -> Option<&Track> {
        self.dataset.get_for(id)
    }

    pub fn get_all_ids(&self) -> BTreeSet<TrackId> {
        self.dataset.track_ids()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn split(&self, batches: usize) -> Vec<D> {
        self.dataset.split(batches)
    }

    pub fn add_all<I: IntoIterator<Item = Track>>(&mut self, tracks: I) {
        let tracks: Vec<Track> = tracks.into_iter().collect();
        if tracks.is_empty() {
            return;
        }

        let added = tracks.iter().map(|t| t.id().clone()).collect();
        self.dataset = self.dataset.add_all(tracks);
        self.notify(TrackRepositoryEvent::create_added(added));
    }

    pub fn remove(&mut self, id: &TrackId) -> Result<(), Error> {
        self.dataset = self.dataset.remove(id)?;
        self.notify(TrackRepositoryEvent::create_removed(BTreeSet::from([id.clone()])));

        Ok(())
    }

    pub fn remove_multiple(&mut self, ids: &BTreeSet<TrackId>) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }

        self.dataset = self.dataset.remove_multiple(ids)?;
        self.notify(TrackRepositoryEvent::create_removed(ids.clone()));

        Ok(())
    }

    pub fn clear(&mut self) {
        let removed = self.dataset.track_ids();
        if removed.is_empty() {
            return;
        }

        self.dataset = self.dataset.clear();
        self.notify(TrackRepositoryEvent::create_removed(removed));
    }

    /// Replaces every track crossing `section` by its fragments and returns
    /// the original ids of the cut tracks.
    pub fn cut_with_section(
        &mut self,
        section: &Section,
        offset: RelativeOffset,
    ) -> Result<BTreeSet<TrackId>, Error> {
        let (dataset, original_ids) = self.dataset.cut_with_section(section, offset)?;
        if original_ids.is_empty() {
            return Ok(original_ids);
        }

        let removed = changed_ids(&self.dataset, &dataset, &original_ids);
        let added = changed_ids(&dataset, &self.dataset, &original_ids);

        self.dataset = dataset;
        self.notify(TrackRepositoryEvent::new(added, removed));

        Ok(original_ids)
    }

    /// Returns the original ids whose fragments were merged back.
    pub fn revert_cuts_for(&mut self, original_ids: &BTreeSet<TrackId>) -> BTreeSet<TrackId> {
        let (dataset, reverted, removed) = self.dataset.revert_cuts_for(original_ids);
        if reverted.is_empty() {
            return reverted;
        }

        self.dataset = dataset;
        self.notify(TrackRepositoryEvent::new(reverted.clone(), removed));

        reverted
    }

    /// Returns the ids of all removed tracks.
    pub fn remove_by_original_ids(&mut self, original_ids: &BTreeSet<TrackId>) -> BTreeSet<TrackId> {
        let (dataset, removed) = self.dataset.remove_by_original_ids(original_ids);
        if removed.is_empty() {
            return removed;
        }

        self.dataset = dataset;
        self.notify(TrackRepositoryEvent::create_removed(removed.clone()));

        removed
    }

    fn notify(&self, event: TrackRepositoryEvent) {
        debug!(
            "notifying {} observers: {} added, {} removed",
            self.observers.len(),
            event.added.len(),
            event.removed.len()
        );

        for observer in &self.observers {
            observer.notify_tracks(&event);
        }
    }
}

/// Ids of `from` descending from `original_ids` whose track differs in `to`.
fn changed_ids<D: TrackDataset>(from: &D, to: &D, original_ids: &BTreeSet<TrackId>) -> BTreeSet<TrackId> {
    from.tracks()
        .into_iter()
        .filter(|t| original_ids.contains(t.original_id()))
        .filter(|t| to.get_for(t.id()) != Some(*t))
        .map(|t| t.id().clone())
        .collect()
}

impl<D: TrackDataset + fmt::Debug> fmt::Debug for TrackRepository<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackRepository")
            .field("dataset", &self.dataset)
            .field("observers", &self.observers.len())
            .finish()
    }
}
