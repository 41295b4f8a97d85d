use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, trace};

use crate::config::TrackDatasetConfig;
use crate::error::Error;
use crate::geometry::{IntersectionPoint, TrackGeometryDataset};
use crate::math::RelativeOffset;
use crate::section::{Section, SectionId};
use crate::track::{ByMaxConfidence, Track, TrackClassificationCalculator, TrackId};

/// Immutable collection of tracks. Every mutator returns a new dataset and
/// leaves the receiver untouched.
pub trait TrackDataset: Clone + Sized {
    fn config(&self) -> &TrackDatasetConfig;

    fn track_ids(&self) -> BTreeSet<TrackId>;

    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_for(&self, id: &TrackId) -> Option<&Track>;

    /// Tracks ordered by id.
    fn tracks(&self) -> Vec<&Track>;

    fn get_for_many(&self, ids: &BTreeSet<TrackId>) -> Vec<&Track> {
        ids.iter().filter_map(|id| self.get_for(id)).collect()
    }

    /// Merges `tracks` into the dataset, detections of known ids are appended.
    fn add_all<I: IntoIterator<Item = Track>>(&self, tracks: I) -> Self;

    fn remove(&self, id: &TrackId) -> Result<Self, Error>;

    /// Fails without removing anything if one of `ids` is unknown.
    fn remove_multiple(&self, ids: &BTreeSet<TrackId>) -> Result<Self, Error>;

    fn clear(&self) -> Self;

    /// At most `batches` datasets with contiguous id ranges.
    fn split(&self, batches: usize) -> Vec<Self>;

    fn filter_by_min_detection_length(&self, length: usize) -> Self;

    fn filter_by_classifications(&self, classifications: &BTreeSet<String>) -> Self;

    fn classifications(&self) -> BTreeSet<String>;

    fn first_occurrence(&self) -> Option<DateTime<Utc>>;

    fn last_occurrence(&self) -> Option<DateTime<Utc>>;

    fn get_max_confidences_for(
        &self,
        ids: &BTreeSet<TrackId>,
    ) -> Result<BTreeMap<TrackId, f64>, Error>;

    /// Geometry of all tracks for `offset`, built on first use.
    fn geometry_for(&self, offset: RelativeOffset) -> Arc<TrackGeometryDataset>;

    fn intersecting_tracks(&self, sections: &[Section], offset: RelativeOffset) -> BTreeSet<TrackId> {
        self.geometry_for(offset).intersecting_tracks(sections)
    }

    fn intersection_points(
        &self,
        sections: &[Section],
        offset: RelativeOffset,
    ) -> BTreeMap<TrackId, Vec<(SectionId, IntersectionPoint)>> {
        self.geometry_for(offset).intersection_points(sections)
    }

    fn contained_by_sections(
        &self,
        sections: &[Section],
        offset: RelativeOffset,
    ) -> BTreeMap<TrackId, Vec<(SectionId, Vec<bool>)>> {
        self.geometry_for(offset).contained_by_sections(sections)
    }

    /// Splits every track crossing `section` at its crossings. Returns the new
    /// dataset and the original ids of all tracks that were cut.
    fn cut_with_section(
        &self,
        section: &Section,
        offset: RelativeOffset,
    ) -> Result<(Self, BTreeSet<TrackId>), Error>;

    /// Merges the fragments of `original_ids` back into their original track.
    /// Returns the new dataset, the reverted original ids and the ids of the
    /// merged fragments.
    fn revert_cuts_for(
        &self,
        original_ids: &BTreeSet<TrackId>,
    ) -> (Self, BTreeSet<TrackId>, BTreeSet<TrackId>);

    /// Drops all tracks descending from `original_ids`, returns the removed ids.
    fn remove_by_original_ids(&self, original_ids: &BTreeSet<TrackId>) -> (Self, BTreeSet<TrackId>);
}

type GeometryCache = HashMap<RelativeOffset, Arc<TrackGeometryDataset>>;

/// Tracks are shared between datasets, each dataset owns its geometry cache.
pub struct SharedTrackDataset {
    tracks: HashMap<TrackId, Arc<Track>>,
    geometries: RwLock<GeometryCache>,
    calculator: Arc<dyn TrackClassificationCalculator>,
    config: Arc<TrackDatasetConfig>,
}

impl SharedTrackDataset {
    pub fn new() -> Self {
        Self::with_config(TrackDatasetConfig::default())
    }

    pub fn with_config(config: TrackDatasetConfig) -> Self {
        Self {
            tracks: HashMap::new(),
            geometries: RwLock::new(HashMap::new()),
            calculator: Arc::new(ByMaxConfidence),
            config: Arc::new(config),
        }
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn TrackClassificationCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn from_tracks<I: IntoIterator<Item = Track>>(tracks: I) -> Self {
        Self::new().add_all(tracks)
    }

    /// Offsets with a cached geometry.
    pub fn cached_offsets(&self) -> BTreeSet<RelativeOffset> {
        self.cache().keys().copied().collect()
    }

    fn cache(&self) -> GeometryCache {
        self.geometries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_tracks(&self, tracks: HashMap<TrackId, Arc<Track>>, geometries: GeometryCache) -> Self {
        Self {
            tracks,
            geometries: RwLock::new(geometries),
            calculator: self.calculator.clone(),
            config: self.config.clone(),
        }
    }

    /// New dataset holding `tracks`, cached geometries are updated for the
    /// `removed` ids and the `changed` tracks instead of being rebuilt.
    fn derive(
        &self,
        tracks: HashMap<TrackId, Arc<Track>>,
        removed: &BTreeSet<TrackId>,
        changed: &[Arc<Track>],
    ) -> Self {
        let geometries = self
            .cache()
            .into_iter()
            .map(|(offset, geometry)| {
                let updated = geometry
                    .remove(removed)
                    .add_all(changed.iter().map(|t| t.as_ref()));
                (offset, Arc::new(updated))
            })
            .collect();

        self.with_tracks(tracks, geometries)
    }

    /// Dataset restricted to `ids`, cached geometries are sliced.
    fn subset(&self, ids: &[TrackId]) -> Self {
        let tracks = ids
            .iter()
            .filter_map(|id| Some((id.clone(), self.tracks.get(id)?.clone())))
            .collect();

        let geometries = self
            .cache()
            .into_iter()
            .map(|(offset, geometry)| (offset, Arc::new(geometry.get_for(ids))))
            .collect();

        self.with_tracks(tracks, geometries)
    }

    fn sorted_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<_> = self.tracks.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn missing(&self, ids: &BTreeSet<TrackId>) -> Result<(), Error> {
        let missing: Vec<TrackId> = ids
            .iter()
            .filter(|id| !self.tracks.contains_key(*id))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::TrackNotFound(missing))
        }
    }

    /// Inserts `track`, merging it with a present track of the same id.
    fn insert_merged(&self, tracks: &mut HashMap<TrackId, Arc<Track>>, track: Arc<Track>) -> Arc<Track> {
        let merged = match tracks.get(track.id()) {
            Some(present) => Arc::new(Track::merged(
                present.id().clone(),
                present.original_id().clone(),
                present
                    .detections()
                    .iter()
                    .chain(track.detections())
                    .cloned(),
                self.calculator.as_ref(),
            )),
            None => track,
        };

        tracks.insert(merged.id().clone(), merged.clone());
        merged
    }

    /// Contiguous runs of equal ids, one fragment per run. Ids already in
    /// `taken` are replaced by the next free counter of the cut track.
    fn fragments_of(
        track: &Track,
        vertex_ids: &[TrackId],
        separator: &str,
        taken: &mut HashSet<TrackId>,
    ) -> Vec<Arc<Track>> {
        let mut fragments = Vec::new();
        let mut counter = 0;
        let mut start = 0;

        for end in 1..=vertex_ids.len() {
            if end < vertex_ids.len() && vertex_ids[end] == vertex_ids[start] {
                continue;
            }

            let mut id = vertex_ids[start].clone();
            if id != *track.id() {
                while !taken.insert(id.clone()) {
                    counter += 1;
                    id = track.id().derived(separator, counter);
                }
            }

            fragments.push(Arc::new(Track::fragment(
                id,
                track.original_id().clone(),
                track.classification().to_string(),
                &track.detections()[start..end],
            )));
            start = end;
        }

        fragments
    }
}

impl Default for SharedTrackDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SharedTrackDataset {
    fn clone(&self) -> Self {
        self.with_tracks(self.tracks.clone(), self.cache())
    }
}

impl PartialEq for SharedTrackDataset {
    fn eq(&self, other: &Self) -> bool {
        self.tracks == other.tracks
    }
}

impl fmt::Debug for SharedTrackDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTrackDataset")
            .field("tracks", &self.tracks.len())
            .field("cached_offsets", &self.cached_offsets())
            .field("calculator", &self.calculator)
            .field("config", &self.config)
            .finish()
    }
}

impl TrackDataset for SharedTrackDataset {
    #[inline]
    fn config(&self) -> &TrackDatasetConfig {
        &self.config
    }

    fn track_ids(&self) -> BTreeSet<TrackId> {
        self.tracks.keys().cloned().collect()
    }

    #[inline]
    fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    fn get_for(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.get(id).map(|t| t.as_ref())
    }

    fn tracks(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = self.tracks.values().map(|t| t.as_ref()).collect();
        tracks.sort_by(|a, b| a.id().cmp(b.id()));
        tracks
    }

    fn add_all<I: IntoIterator<Item = Track>>(&self, tracks: I) -> Self {
        let mut incoming = tracks.into_iter().peekable();
        if incoming.peek().is_none() {
            return self.clone();
        }

        let mut merged = self.tracks.clone();
        let mut changed: BTreeMap<TrackId, Arc<Track>> = BTreeMap::new();
        for track in incoming {
            let track = self.insert_merged(&mut merged, Arc::new(track));
            changed.insert(track.id().clone(), track);
        }

        debug!("added {} tracks, dataset holds {}", changed.len(), merged.len());

        let changed: Vec<_> = changed.into_values().collect();
        self.derive(merged, &BTreeSet::new(), &changed)
    }

    fn remove(&self, id: &TrackId) -> Result<Self, Error> {
        self.remove_multiple(&BTreeSet::from([id.clone()]))
    }

    fn remove_multiple(&self, ids: &BTreeSet<TrackId>) -> Result<Self, Error> {
        self.missing(ids)?;

        let mut tracks = self.tracks.clone();
        for id in ids {
            tracks.remove(id);
        }

        Ok(self.derive(tracks, ids, &[]))
    }

    fn clear(&self) -> Self {
        self.with_tracks(HashMap::new(), HashMap::new())
    }

    fn split(&self, batches: usize) -> Vec<Self> {
        let ids = self.sorted_ids();
        if ids.is_empty() {
            return vec![self.clone()];
        }

        let batches = batches.max(1);
        let batch_size = (ids.len() + batches - 1) / batches;

        ids.chunks(batch_size).map(|chunk| self.subset(chunk)).collect()
    }

    fn filter_by_min_detection_length(&self, length: usize) -> Self {
        let ids: Vec<TrackId> = self
            .sorted_ids()
            .into_iter()
            .filter(|id| self.tracks[id].len() >= length)
            .collect();

        self.subset(&ids)
    }

    fn filter_by_classifications(&self, classifications: &BTreeSet<String>) -> Self {
        let ids: Vec<TrackId> = self
            .sorted_ids()
            .into_iter()
            .filter(|id| classifications.contains(self.tracks[id].classification()))
            .collect();

        self.subset(&ids)
    }

    fn classifications(&self) -> BTreeSet<String> {
        self.tracks
            .values()
            .map(|t| t.classification().to_string())
            .collect()
    }

    fn first_occurrence(&self) -> Option<DateTime<Utc>> {
        self.tracks.values().map(|t| t.first_occurrence()).min()
    }

    fn last_occurrence(&self) -> Option<DateTime<Utc>> {
        self.tracks.values().map(|t| t.last_occurrence()).max()
    }

    fn get_max_confidences_for(
        &self,
        ids: &BTreeSet<TrackId>,
    ) -> Result<BTreeMap<TrackId, f64>, Error> {
        self.missing(ids)?;

        Ok(ids
            .iter()
            .map(|id| (id.clone(), self.tracks[id].max_confidence()))
            .collect())
    }

    fn geometry_for(&self, offset: RelativeOffset) -> Arc<TrackGeometryDataset> {
        if let Some(geometry) = self
            .geometries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&offset)
        {
            trace!("geometry cache hit for offset ({}, {})", offset.x(), offset.y());
            return geometry.clone();
        }

        let built = Arc::new(TrackGeometryDataset::from_tracks(
            self.tracks.values().map(|t| t.as_ref()),
            offset,
        ));

        self.geometries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(offset)
            .or_insert(built)
            .clone()
    }

    fn cut_with_section(
        &self,
        section: &Section,
        offset: RelativeOffset,
    ) -> Result<(Self, BTreeSet<TrackId>), Error> {
        if !section.is_line_like() {
            return Err(Error::NotACuttingSection(section.id().clone()));
        }

        let ids_after_cut = self
            .geometry_for(offset)
            .track_ids_after_cut(section, &self.config.cut_id_separator);

        if ids_after_cut.is_empty() {
            return Ok((self.clone(), BTreeSet::new()));
        }

        let mut tracks = self.tracks.clone();
        let mut taken: HashSet<TrackId> = self.tracks.keys().cloned().collect();
        let mut cut_ids = BTreeSet::new();
        let mut original_ids = BTreeSet::new();
        let mut fragments = Vec::new();

        for (id, vertex_ids) in &ids_after_cut {
            let track = match self.tracks.get(id) {
                Some(track) => track,
                None => continue,
            };

            cut_ids.insert(id.clone());
            original_ids.insert(track.original_id().clone());
            fragments.extend(Self::fragments_of(
                track,
                vertex_ids,
                &self.config.cut_id_separator,
                &mut taken,
            ));
        }

        for fragment in &fragments {
            tracks.insert(fragment.id().clone(), fragment.clone());
        }

        debug!(
            "cut {} tracks into {} fragments with section {}",
            cut_ids.len(),
            fragments.len(),
            section.id()
        );

        Ok((self.derive(tracks, &cut_ids, &fragments), original_ids))
    }

    fn revert_cuts_for(
        &self,
        original_ids: &BTreeSet<TrackId>,
    ) -> (Self, BTreeSet<TrackId>, BTreeSet<TrackId>) {
        let mut families: BTreeMap<&TrackId, Vec<&Arc<Track>>> = BTreeMap::new();
        for track in self.tracks.values() {
            if original_ids.contains(track.original_id()) {
                families.entry(track.original_id()).or_default().push(track);
            }
        }

        let mut tracks = self.tracks.clone();
        let mut reverted = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut restored = Vec::new();

        for (original_id, members) in families {
            if !members.iter().any(|t| t.is_cut()) {
                trace!("track {} has no cuts to revert", original_id);
                continue;
            }

            for member in &members {
                tracks.remove(member.id());
                removed.insert(member.id().clone());
            }

            let track = Arc::new(Track::merged(
                original_id.clone(),
                original_id.clone(),
                members.iter().flat_map(|t| t.detections().iter().cloned()),
                self.calculator.as_ref(),
            ));

            tracks.insert(original_id.clone(), track.clone());
            restored.push(track);
            reverted.insert(original_id.clone());
        }

        if reverted.is_empty() {
            return (self.clone(), reverted, removed);
        }

        debug!(
            "reverted cuts of {} tracks, merged {} fragments",
            reverted.len(),
            removed.len()
        );

        (self.derive(tracks, &removed, &restored), reverted, removed)
    }

    fn remove_by_original_ids(&self, original_ids: &BTreeSet<TrackId>) -> (Self, BTreeSet<TrackId>) {
        let removed: BTreeSet<TrackId> = self
            .tracks
            .values()
            .filter(|t| original_ids.contains(t.original_id()))
            .map(|t| t.id().clone())
            .collect();

        if removed.is_empty() {
            return (self.clone(), removed);
        }

        let mut tracks = self.tracks.clone();
        for id in &removed {
            tracks.remove(id);
        }

        (self.derive(tracks, &removed, &[]), removed)
    }
}
