use nutype::nutype;

/// Unique identifier of a job in the scheduler.
#[nutype(derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref))]
pub struct JobUid(String);

/// Name under which a remote DICOM node is configured.
#[nutype(
    sanitize(trim),
    derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref)
)]
pub struct ConnectionName(String);

/// DICOM Application Entity title.
///
/// Ref: <https://dicom.nema.org/medical/dicom/current/output/chtml/part08/chapter_C.html>
#[nutype(
    sanitize(trim),
    validate(predicate = |s| !s.is_empty() && s.len() <= 16),
    derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref)
)]
pub struct AeTitle(String);

/// DICOM PatientID (0010,0020).
#[nutype(
    sanitize(trim),
    derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref)
)]
pub struct PatientId(String);

/// DICOM StudyInstanceUID (0020,000D).
#[nutype(
    sanitize(trim),
    derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref)
)]
pub struct StudyInstanceUid(String);

/// DICOM SeriesInstanceUID (0020,000E).
#[nutype(
    sanitize(trim),
    derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref)
)]
pub struct SeriesInstanceUid(String);

/// DICOM SOPInstanceUID (0008,0018).
#[nutype(
    sanitize(trim),
    derive(Serialize, Deserialize, Clone, Display, Debug, Eq, PartialEq, Hash, AsRef, Deref)
)]
pub struct SopInstanceUid(String);
