//! Data model of the DICOM job scheduler: identifiers, addressing keys,
//! remote node configuration, job statuses and response sets.

mod dicom;
mod event;
mod job;
mod server;
mod types;

pub use crate::dicom::*;
pub use crate::event::*;
pub use crate::job::*;
pub use crate::server::*;
pub use crate::types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::json;
    use std::time::Duration;

    fn series_dataset(sop: &str) -> Dataset {
        Dataset::new()
            .with("PatientID", "1449c1d")
            .with("StudyInstanceUID", "1.2.840.113845.11.1000000001785349915")
            .with("SeriesInstanceUID", "1.3.12.2.1107.5.2.19.45152")
            .with("SOPInstanceUID", sop)
    }

    #[test]
    fn test_address_drops_deeper_keys() {
        let actual = DicomAddress::new(
            DicomLevel::Studies,
            Some(PatientId::new("1449c1d")),
            Some(StudyInstanceUid::new("1.2.3")),
            Some(SeriesInstanceUid::new("1.2.3.4")),
            Some(SopInstanceUid::new("1.2.3.4.5")),
        );
        assert_eq!(actual.study_instance_uid(), Some(&StudyInstanceUid::new("1.2.3")));
        assert_eq!(actual.series_instance_uid(), None);
        assert_eq!(actual.sop_instance_uid(), None);
    }

    #[test]
    fn test_deserialize_address() {
        let data = json!({
            "Level": "Series",
            "PatientID": " 1449c1d ",
            "StudyInstanceUID": "1.2.3",
            "SeriesInstanceUID": "1.2.3.4",
            "SOPInstanceUID": null
        });
        let actual: DicomAddress = serde_json::from_value(data).unwrap();
        let expected = DicomAddress::series(
            PatientId::new("1449c1d"),
            StudyInstanceUid::new("1.2.3"),
            SeriesInstanceUid::new("1.2.3.4"),
        );
        assert_eq!(actual, expected)
    }

    #[test]
    fn test_deserialize_address_drops_deeper_keys() {
        let data = json!({
            "Level": "Studies",
            "PatientID": "1449c1d",
            "StudyInstanceUID": "1.2.3",
            "SeriesInstanceUID": "1.2",
            "SOPInstanceUID": "1.2.3"
        });
        let actual: DicomAddress = serde_json::from_value(data).unwrap();
        assert_eq!(actual.series_instance_uid(), None);
        assert_eq!(actual.sop_instance_uid(), None);
        let expected = DicomAddress::study(PatientId::new("1449c1d"), StudyInstanceUid::new("1.2.3"));
        assert_eq!(actual, expected)
    }

    #[rstest]
    #[case(DicomLevel::Patients, "PATIENT")]
    #[case(DicomLevel::Studies, "STUDY")]
    #[case(DicomLevel::Series, "SERIES")]
    #[case(DicomLevel::Instances, "IMAGE")]
    fn test_query_retrieve_level(#[case] level: DicomLevel, #[case] expected: &str) {
        assert_eq!(level.query_retrieve_level(), expected)
    }

    #[rstest]
    #[case(JobStatus::Initialized, JobStatus::Queued, true)]
    #[case(JobStatus::Queued, JobStatus::Running, true)]
    #[case(JobStatus::Queued, JobStatus::Stopped, true)]
    #[case(JobStatus::Running, JobStatus::Queued, true)]
    #[case(JobStatus::Running, JobStatus::Failed, true)]
    #[case(JobStatus::Stopped, JobStatus::Finished, true)]
    #[case(JobStatus::Stopped, JobStatus::Failed, false)]
    #[case(JobStatus::Finished, JobStatus::Queued, false)]
    #[case(JobStatus::Failed, JobStatus::Running, false)]
    #[case(JobStatus::Initialized, JobStatus::Running, false)]
    fn test_status_transitions(
        #[case] from: JobStatus,
        #[case] to: JobStatus,
        #[case] expected: bool,
    ) {
        assert_eq!(from.can_transition_to(to), expected)
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(Priority::default(), Priority::Low);
        assert!(Priority::TimeCritical > Priority::Highest);
        assert!(Priority::Lowest > Priority::Idle);
    }

    #[rstest]
    #[case(JobKind::Query, Some(DicomLevel::Patients), ResponseType::QueryPatients)]
    #[case(JobKind::Retrieve, Some(DicomLevel::Series), ResponseType::RetrieveSeries)]
    #[case(JobKind::Retrieve, Some(DicomLevel::Patients), ResponseType::None)]
    #[case(JobKind::StorageListen, None, ResponseType::StoreSopInstance)]
    #[case(JobKind::Echo, None, ResponseType::None)]
    fn test_response_type_for_job(
        #[case] kind: JobKind,
        #[case] level: Option<DicomLevel>,
        #[case] expected: ResponseType,
    ) {
        assert_eq!(ResponseType::for_job(kind, level), expected)
    }

    #[test]
    fn test_response_set_keys_by_sop_instance_uid() {
        let mut set = JobResponseSet::new(JobUid::new("job"), ResponseType::RetrieveSeries);
        assert!(set.insert_dataset(series_dataset("1.1")).is_none());
        assert!(set.insert_dataset(series_dataset("1.2")).is_none());
        let replaced = set.insert_dataset(series_dataset("1.1").with("InstanceNumber", 1));
        assert_eq!(replaced, Some(series_dataset("1.1")));
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.datasets()["1.1"].get("InstanceNumber"),
            Some(&json!(1))
        );
    }

    #[test]
    fn test_query_answers_keyed_by_their_tier() {
        let mut set = JobResponseSet::new(JobUid::new("job"), ResponseType::QueryStudies);
        set.insert_dataset(Dataset::new().with("PatientID", "p").with("StudyInstanceUID", "1"));
        set.insert_dataset(Dataset::new().with("PatientID", "p").with("StudyInstanceUID", "2"));
        let mut keys: Vec<_> = set.datasets().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_to_detail() {
        let address = DicomAddress::series(
            PatientId::new("1449c1d"),
            StudyInstanceUid::new("1.2.3"),
            SeriesInstanceUid::new("1.2.3.4"),
        );
        let mut set = JobResponseSet::new(JobUid::new("job"), ResponseType::RetrieveSeries)
            .with_address(&address)
            .with_connection_name(ConnectionName::new("PACS"));
        set.insert_dataset(series_dataset("1.1"));
        let expected = JobDetail {
            type_of_job: ResponseType::RetrieveSeries,
            job_uid: JobUid::new("job"),
            patient_id: Some(PatientId::new("1449c1d")),
            study_instance_uid: Some(StudyInstanceUid::new("1.2.3")),
            series_instance_uid: Some(SeriesInstanceUid::new("1.2.3.4")),
            sop_instance_uid: None,
            connection_name: Some(ConnectionName::new("PACS")),
            number_of_datasets: 1,
        };
        assert_eq!(set.to_detail(), expected)
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("THIS_AE_TITLE_IS_TOO_LONG")]
    fn test_invalid_ae_title(#[case] value: &str) {
        assert!(AeTitle::try_new(value).is_err())
    }

    #[test]
    fn test_deserialize_server_with_proxy() {
        let data = json!({
            "ConnectionName": "PACS",
            "CallingAETitle": "CTK",
            "CalledAETitle": "PACS",
            "Host": "pacs.example.org",
            "Port": 4242,
            "RetrieveProtocol": "CMOVE",
            "ConnectionTimeout": 10,
            "MoveDestinationAETitle": "CTK",
            "ProxyServer": {
                "ConnectionName": "Proxy",
                "QueryRetrieveEnabled": false,
                "CallingAETitle": "CTK",
                "CalledAETitle": "PROXY",
                "Host": "localhost",
                "Port": 11112
            }
        });
        let actual: Server = serde_json::from_value(data).unwrap();
        assert_eq!(actual.retrieve_protocol, RetrieveProtocol::Move);
        assert_eq!(actual.connection_timeout, Duration::from_secs(10));
        assert!(actual.query_retrieve_enabled);
        let proxy = actual.proxy_server.as_deref().unwrap();
        assert_eq!(proxy.connection_name, ConnectionName::new("Proxy"));
        assert_eq!(proxy.retrieve_protocol, RetrieveProtocol::Get);
        assert_eq!(actual.active_proxy(), None);
    }

    #[test]
    fn test_serialize_event() {
        let event = JobEvent {
            job_uid: JobUid::new("job"),
            kind: JobKind::Retrieve,
            event: JobEventKind::Retrying {
                attempt: 2,
                delay: Duration::from_millis(100),
            },
        };
        let expected = json!({
            "JobUID": "job",
            "Kind": "Retrieve",
            "Event": {
                "Type": "Retrying",
                "Content": { "Attempt": 2, "Delay": 100 }
            }
        });
        assert_eq!(serde_json::to_value(&event).unwrap(), expected)
    }
}
