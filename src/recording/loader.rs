//! Loader for raw recorder CSV files.
//!
//! Layout on disk is `<root>/<performer>/<gesture>/<sensor>_<stamp>.csv`,
//! where the recorder's stamp is its creation time (`2019-05-12_10-11-12`).
//! A `-` separator after the sensor prefix is accepted too. The five files
//! sharing a stamp make up one [`GestureRecord`].

use crate::recording::types::{GestureRecord, SensorKind, SensorStream};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The CSV files that together form one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFiles {
    pub performed_by: String,
    pub label: String,
    pub stamp: String,
    pub files: BTreeMap<SensorKind, PathBuf>,
}

impl RecordingFiles {
    /// Whether a file exists for every sensor.
    pub fn is_complete(&self) -> bool {
        SensorKind::ALL.iter().all(|kind| self.files.contains_key(kind))
    }

    /// Read all five sensor files into a record.
    pub fn load(&self) -> Result<GestureRecord> {
        let mut streams = Vec::with_capacity(SensorKind::ALL.len());
        for kind in SensorKind::ALL {
            let path = self
                .files
                .get(&kind)
                .ok_or_else(|| anyhow!("recording {} has no {} file", self.stamp, kind))?;
            streams.push(load_stream(path, kind)?);
        }

        let accelerometer_path = &self.files[&SensorKind::Accelerometer];
        let captured_at = file_modified(accelerometer_path)?;

        let streams: [SensorStream; 5] = streams
            .try_into()
            .map_err(|_| anyhow!("recording {} did not yield five streams", self.stamp))?;
        GestureRecord::new(&self.label, &self.performed_by, captured_at, streams)
            .with_context(|| format!("assembling recording {}", self.stamp))
    }
}

/// Load one sensor CSV (header line, then `timestamp,axis...` rows).
pub fn load_stream(path: impl AsRef<Path>, kind: SensorKind) -> Result<SensorStream> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("could not open {:?}", path))?;

    let axis_count = kind.axis_count();
    let mut timestamps = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); axis_count];

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("invalid row {} in {:?}", row_idx + 1, path))?;
        if record.len() < axis_count + 1 {
            bail!(
                "row {} in {:?} has {} columns, expected {}",
                row_idx + 1,
                path,
                record.len(),
                axis_count + 1
            );
        }

        let timestamp: i64 = record[0]
            .trim()
            .parse()
            .with_context(|| format!("invalid timestamp in row {} of {:?}", row_idx + 1, path))?;
        timestamps.push(timestamp);

        for (column, values) in columns.iter_mut().enumerate() {
            let value: f64 = record[column + 1].trim().parse().with_context(|| {
                format!("invalid sample in row {} column {} of {:?}", row_idx + 1, column + 1, path)
            })?;
            values.push(value);
        }
    }

    // The recorder writes Euler angles as pitch,roll,yaw.
    if kind == SensorKind::OrientationEuler {
        columns.swap(0, 1);
    }

    SensorStream::new(kind, timestamps, columns).with_context(|| format!("loading {:?}", path))
}

/// Group the CSV files of one gesture directory into recordings.
pub fn discover_gesture_dir(
    dir: impl AsRef<Path>,
    performed_by: &str,
    label: &str,
) -> Result<Vec<RecordingFiles>> {
    let dir = dir.as_ref();
    let mut grouped: BTreeMap<String, BTreeMap<SensorKind, PathBuf>> = BTreeMap::new();

    for entry in fs::read_dir(dir).with_context(|| format!("could not read {:?}", dir))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((kind, stamp)) = split_file_stem(stem) else {
            tracing::debug!("skipping {:?}: not a sensor recording file", path);
            continue;
        };
        grouped
            .entry(stamp.to_string())
            .or_default()
            .insert(kind, path.clone());
    }

    Ok(grouped
        .into_iter()
        .map(|(stamp, files)| RecordingFiles {
            performed_by: performed_by.to_string(),
            label: label.to_string(),
            stamp,
            files,
        })
        .collect())
}

/// Split `<sensor>_<stamp>` (or `<sensor>-<stamp>`) into its parts.
///
/// The separator must follow the prefix directly, so `orientation` never
/// claims an `orientationEuler_...` file.
fn split_file_stem(stem: &str) -> Option<(SensorKind, &str)> {
    SensorKind::ALL.into_iter().find_map(|kind| {
        let stamp = stem
            .strip_prefix(kind.file_prefix())?
            .strip_prefix(|c: char| c == '_' || c == '-')?;
        (!stamp.is_empty()).then_some((kind, stamp))
    })
}

/// Walk `<root>/<performer>/<gesture>/` and list every recording found.
pub fn discover_dataset(root: impl AsRef<Path>) -> Result<Vec<RecordingFiles>> {
    let root = root.as_ref();
    let mut recordings = Vec::new();

    for performer in sorted_subdirs(root)? {
        let performer_name = dir_name(&performer)?;
        for gesture in sorted_subdirs(&performer)? {
            let label = dir_name(&gesture)?;
            recordings.extend(discover_gesture_dir(&gesture, &performer_name, &label)?);
        }
    }

    Ok(recordings)
}

/// Load every complete recording below `root`.
///
/// Incomplete or unreadable recordings are logged and left out.
pub fn load_dataset(root: impl AsRef<Path>) -> Result<Vec<GestureRecord>> {
    let mut records = Vec::new();
    for files in discover_dataset(root)? {
        if !files.is_complete() {
            tracing::warn!(
                "skipping recording {} of {}/{}: missing sensor files",
                files.stamp,
                files.performed_by,
                files.label
            );
            continue;
        }
        match files.load() {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("skipping recording {}: {e:#}", files.stamp),
        }
    }
    Ok(records)
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("could not read {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("directory {:?} has no usable name", path))
}

fn file_modified(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("could not read modification time of {:?}", path))?;
    Ok(DateTime::<Utc>::from(modified))
}
