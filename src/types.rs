// src/types.rs

//! Small value types shared across the crate.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Boxed, sendable future used at the crate's trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifier of one trigger event, e.g. `GRB240101123`.
///
/// Entities become directory names in the artifact store, so only ASCII
/// alphanumerics, `_` and `-` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Entity(String);

impl Entity {
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.is_empty() {
            return Err("entity name must not be empty".to_string());
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(format!(
                "entity name '{name}' contains invalid character '{bad}'"
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Burst number used in remote file names (`bn<number>`).
    ///
    /// `GRB240101123` → `240101123`. Names without the prefix are used as-is.
    pub fn burst_number(&self) -> &str {
        self.0.strip_prefix("GRB").unwrap_or(&self.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Entity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Entity::new(value)
    }
}

impl From<Entity> for String {
    fn from(value: Entity) -> Self {
        value.0
    }
}

impl FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::new(s.trim())
    }
}

/// Closed set of artifact kinds the store knows how to lay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// The structured trigger record handed over by the notification parser.
    TriggerRecord,
    /// Trigger data file (`glg_trigdat_all_*`).
    Trigdat,
    /// Time-tagged event file for one detector.
    Tte,
    /// Continuous spectral file for one detector.
    Cspec,
    /// Marker written once remote TTE/CSPEC files are known to be published.
    AvailabilityProbe,
    /// Small key/value document recording which version won a race.
    VersionRecord,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::TriggerRecord => "trigger-record",
            ArtifactKind::Trigdat => "trigdat",
            ArtifactKind::Tte => "tte",
            ArtifactKind::Cspec => "cspec",
            ArtifactKind::AvailabilityProbe => "availability-probe",
            ArtifactKind::VersionRecord => "version-record",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier of one downloadable or derived file.
///
/// `qualifier` carries the detector for per-detector files (`n0`, `b1`, ...)
/// and the product name for version records (`trigdat`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub entity: Entity,
    pub kind: ArtifactKind,
    pub version: Option<String>,
    pub qualifier: Option<String>,
}

impl ArtifactKey {
    pub fn trigger_record(entity: &Entity) -> Self {
        Self::bare(entity, ArtifactKind::TriggerRecord)
    }

    pub fn trigdat(entity: &Entity, version: &str) -> Self {
        Self {
            entity: entity.clone(),
            kind: ArtifactKind::Trigdat,
            version: Some(version.to_string()),
            qualifier: None,
        }
    }

    pub fn tte(entity: &Entity, detector: &str, version: &str) -> Self {
        Self {
            entity: entity.clone(),
            kind: ArtifactKind::Tte,
            version: Some(version.to_string()),
            qualifier: Some(detector.to_string()),
        }
    }

    pub fn cspec(entity: &Entity, detector: &str, version: &str) -> Self {
        Self {
            entity: entity.clone(),
            kind: ArtifactKind::Cspec,
            version: Some(version.to_string()),
            qualifier: Some(detector.to_string()),
        }
    }

    pub fn availability_probe(entity: &Entity) -> Self {
        Self::bare(entity, ArtifactKind::AvailabilityProbe)
    }

    /// Record of the winning version for `product` (e.g. `"trigdat"`).
    pub fn version_record(entity: &Entity, product: &str) -> Self {
        Self {
            entity: entity.clone(),
            kind: ArtifactKind::VersionRecord,
            version: None,
            qualifier: Some(product.to_string()),
        }
    }

    fn bare(entity: &Entity, kind: ArtifactKind) -> Self {
        Self {
            entity: entity.clone(),
            kind,
            version: None,
            qualifier: None,
        }
    }

    fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or("v00")
    }

    fn qualifier_or_default(&self) -> &str {
        self.qualifier.as_deref().unwrap_or("unknown")
    }

    /// File name of the payload, identical to the remote file name for
    /// downloadable kinds.
    pub fn file_name(&self) -> String {
        let bn = self.entity.burst_number();
        match self.kind {
            ArtifactKind::TriggerRecord => "trigger.json".to_string(),
            ArtifactKind::Trigdat => {
                format!("glg_trigdat_all_bn{bn}_{}.fit", self.version_or_default())
            }
            ArtifactKind::Tte => format!(
                "glg_tte_{}_bn{bn}_{}.fit",
                self.qualifier_or_default(),
                self.version_or_default()
            ),
            ArtifactKind::Cspec => format!(
                "glg_cspec_{}_bn{bn}_{}.pha",
                self.qualifier_or_default(),
                self.version_or_default()
            ),
            ArtifactKind::AvailabilityProbe => "tte_cspec_avail.txt".to_string(),
            ArtifactKind::VersionRecord => {
                format!("gather_{}_complete.json", self.qualifier_or_default())
            }
        }
    }

    /// Location relative to the store's base directory:
    /// `<entity>/<kind subdir>/<file>`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.entity.as_str());
        match self.kind {
            ArtifactKind::Trigdat => path.push("trigdat"),
            ArtifactKind::Tte | ArtifactKind::Cspec => {
                path.push("tte");
                path.push("data");
            }
            ArtifactKind::TriggerRecord
            | ArtifactKind::AvailabilityProbe
            | ArtifactKind::VersionRecord => {}
        }
        path.push(self.file_name());
        path
    }

    /// Remote file name, for kinds that are downloaded.
    pub fn remote_name(&self) -> Option<String> {
        match self.kind {
            ArtifactKind::Trigdat | ArtifactKind::Tte | ArtifactKind::Cspec => {
                Some(self.file_name())
            }
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.kind)?;
        if let Some(q) = &self.qualifier {
            write!(f, "/{q}")?;
        }
        if let Some(v) = &self.version {
            write!(f, "@{v}")?;
        }
        Ok(())
    }
}
