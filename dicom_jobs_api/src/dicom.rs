use crate::types::{PatientId, SeriesInstanceUid, SopInstanceUid, StudyInstanceUid};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tier of the DICOM information model addressed by a query or retrieve.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum DicomLevel {
    Patients,
    Studies,
    Series,
    Instances,
}

impl DicomLevel {
    /// Value of QueryRetrieveLevel (0008,0052) for this tier.
    pub fn query_retrieve_level(&self) -> &'static str {
        match self {
            DicomLevel::Patients => "PATIENT",
            DicomLevel::Studies => "STUDY",
            DicomLevel::Series => "SERIES",
            DicomLevel::Instances => "IMAGE",
        }
    }
}

impl std::fmt::Display for DicomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DicomLevel::Patients => "patients",
            DicomLevel::Studies => "studies",
            DicomLevel::Series => "series",
            DicomLevel::Instances => "instances",
        };
        f.write_str(name)
    }
}

/// The DICOM keys of a job.
///
/// Only keys at or above [DicomAddress::level] are kept: a study-level
/// address never carries a SeriesInstanceUID, even if one was given.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash)]
#[serde(rename_all = "PascalCase", from = "AddressKeys")]
pub struct DicomAddress {
    level: DicomLevel,
    #[serde(rename = "PatientID")]
    patient_id: Option<PatientId>,
    #[serde(rename = "StudyInstanceUID")]
    study_instance_uid: Option<StudyInstanceUid>,
    #[serde(rename = "SeriesInstanceUID")]
    series_instance_uid: Option<SeriesInstanceUid>,
    #[serde(rename = "SOPInstanceUID")]
    sop_instance_uid: Option<SopInstanceUid>,
}

/// [DicomAddress] as it appears in JSON, before deeper keys are dropped.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressKeys {
    level: DicomLevel,
    #[serde(rename = "PatientID")]
    patient_id: Option<PatientId>,
    #[serde(rename = "StudyInstanceUID")]
    study_instance_uid: Option<StudyInstanceUid>,
    #[serde(rename = "SeriesInstanceUID")]
    series_instance_uid: Option<SeriesInstanceUid>,
    #[serde(rename = "SOPInstanceUID")]
    sop_instance_uid: Option<SopInstanceUid>,
}

impl From<AddressKeys> for DicomAddress {
    fn from(keys: AddressKeys) -> Self {
        Self::new(
            keys.level,
            keys.patient_id,
            keys.study_instance_uid,
            keys.series_instance_uid,
            keys.sop_instance_uid,
        )
    }
}

impl DicomAddress {
    /// Create an address at `level`, dropping keys deeper than `level`.
    pub fn new(
        level: DicomLevel,
        patient_id: Option<PatientId>,
        study_instance_uid: Option<StudyInstanceUid>,
        series_instance_uid: Option<SeriesInstanceUid>,
        sop_instance_uid: Option<SopInstanceUid>,
    ) -> Self {
        Self {
            level,
            patient_id,
            study_instance_uid: study_instance_uid.filter(|_| level >= DicomLevel::Studies),
            series_instance_uid: series_instance_uid.filter(|_| level >= DicomLevel::Series),
            sop_instance_uid: sop_instance_uid.filter(|_| level >= DicomLevel::Instances),
        }
    }

    /// A whole patient.
    pub fn patient(patient_id: PatientId) -> Self {
        Self::new(DicomLevel::Patients, Some(patient_id), None, None, None)
    }

    /// A single study.
    pub fn study(patient_id: PatientId, study: StudyInstanceUid) -> Self {
        Self::new(DicomLevel::Studies, Some(patient_id), Some(study), None, None)
    }

    /// A single series.
    pub fn series(patient_id: PatientId, study: StudyInstanceUid, series: SeriesInstanceUid) -> Self {
        Self::new(
            DicomLevel::Series,
            Some(patient_id),
            Some(study),
            Some(series),
            None,
        )
    }

    /// A single SOP instance.
    pub fn instance(
        patient_id: PatientId,
        study: StudyInstanceUid,
        series: SeriesInstanceUid,
        sop: SopInstanceUid,
    ) -> Self {
        Self::new(
            DicomLevel::Instances,
            Some(patient_id),
            Some(study),
            Some(series),
            Some(sop),
        )
    }

    pub fn level(&self) -> DicomLevel {
        self.level
    }

    pub fn patient_id(&self) -> Option<&PatientId> {
        self.patient_id.as_ref()
    }

    pub fn study_instance_uid(&self) -> Option<&StudyInstanceUid> {
        self.study_instance_uid.as_ref()
    }

    pub fn series_instance_uid(&self) -> Option<&SeriesInstanceUid> {
        self.series_instance_uid.as_ref()
    }

    pub fn sop_instance_uid(&self) -> Option<&SopInstanceUid> {
        self.sop_instance_uid.as_ref()
    }
}

/// A DICOM dataset exchanged with a remote node, keyed by DICOM keyword
/// (e.g. `"SOPInstanceUID"`).
///
/// Values are kept as JSON since their type depends on the VR of each element.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Dataset(BTreeMap<CompactString, serde_json::Value>);

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of an element.
    pub fn with(mut self, keyword: &str, value: impl Into<serde_json::Value>) -> Self {
        self.insert(keyword, value);
        self
    }

    pub fn insert(&mut self, keyword: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(CompactString::new(keyword), value.into());
    }

    pub fn get(&self, keyword: &str) -> Option<&serde_json::Value> {
        self.0.get(keyword)
    }

    /// Get a string-valued element.
    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(|v| v.as_str())
    }

    pub fn sop_instance_uid(&self) -> Option<&str> {
        self.get_str("SOPInstanceUID")
    }

    /// The most specific unique identifier present in this dataset, used as
    /// its key in a [crate::JobResponseSet].
    ///
    /// Query answers above instance level have no SOPInstanceUID, so they are
    /// keyed by the UID of the tier they describe.
    pub fn unique_key(&self) -> &str {
        ["SOPInstanceUID", "SeriesInstanceUID", "StudyInstanceUID", "PatientID"]
            .into_iter()
            .find_map(|keyword| self.get_str(keyword))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, &serde_json::Value)> {
        self.0.iter()
    }
}
