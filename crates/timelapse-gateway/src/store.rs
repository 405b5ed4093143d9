//! Camera definitions persisted as one JSON object keyed by camera name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use timelapse_core::{Result, TimelapseError};
use timelapse_scheduler::{CameraDefinition, FirstAnchor, LastAnchor, Location, SchedulerError};
use tracing::{debug, info};

/// One camera as stored on disk. Anchors stay in their flag encoding here;
/// [`StoredCamera::to_definition`] turns them into the scheduler's enums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCamera {
    pub url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub first_anchor_flags: u8,
    pub last_anchor_flags: u8,
    /// Wall-clock time for the fixed-time first anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_time: Option<NaiveTime>,
    pub additional_count: u32,
    pub folder_path: String,
}

impl StoredCamera {
    pub fn to_definition(
        &self,
        name: &str,
    ) -> std::result::Result<CameraDefinition, SchedulerError> {
        Ok(CameraDefinition {
            name: name.to_string(),
            url: self.url.clone(),
            location: Location {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            first: FirstAnchor::from_flags(self.first_anchor_flags, self.first_time)?,
            last: LastAnchor::from_flags(self.last_anchor_flags, self.last_time)?,
            additional: self.additional_count,
            folder_path: PathBuf::from(&self.folder_path),
        })
    }
}

impl From<&CameraDefinition> for StoredCamera {
    fn from(camera: &CameraDefinition) -> Self {
        Self {
            url: camera.url.clone(),
            latitude: camera.location.latitude,
            longitude: camera.location.longitude,
            first_anchor_flags: camera.first.flags(),
            last_anchor_flags: camera.last.flags(),
            first_time: camera.first.fixed_time(),
            last_time: camera.last.fixed_time(),
            additional_count: camera.additional,
            folder_path: camera.folder_path.to_string_lossy().into_owned(),
        }
    }
}

/// In-memory copy of the camera file. Changes reach disk on [`save`].
///
/// [`save`]: CameraStore::save
#[derive(Debug)]
pub struct CameraStore {
    path: PathBuf,
    cameras: BTreeMap<String, StoredCamera>,
}

impl CameraStore {
    /// Read the store; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cameras = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "camera store not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), cameras = cameras.len(), "camera store loaded");
        Ok(Self { path, cameras })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StoredCamera> {
        self.cameras.get(name)
    }

    /// All cameras, ordered by name.
    pub fn list(&self) -> impl Iterator<Item = (&str, &StoredCamera)> {
        self.cameras.iter().map(|(name, camera)| (name.as_str(), camera))
    }

    pub fn append(&mut self, name: &str, camera: StoredCamera) -> Result<()> {
        if self.cameras.contains_key(name) {
            return Err(TimelapseError::CameraExists {
                name: name.to_string(),
            });
        }
        self.cameras.insert(name.to_string(), camera);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<StoredCamera> {
        self.cameras
            .remove(name)
            .ok_or_else(|| TimelapseError::CameraNotFound {
                name: name.to_string(),
            })
    }

    /// Write pretty JSON to a sibling temp file, then rename over the store.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_string_pretty(&self.cameras)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), cameras = self.cameras.len(), "camera store saved");
        Ok(())
    }
}
