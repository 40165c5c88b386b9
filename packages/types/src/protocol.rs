//! Messages exchanged between the dispatcher and a worker process.
//! Each message is one JSON object per line, tagged by `type`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Credential, JobError, JobId, JobPayload, JobResult, NetworkTable, VerificationSettings,
};

/// Sent once to each worker before any job
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSettings {
    pub networks: NetworkTable,
    pub verification: VerificationSettings,
    /// Template number to contract name, used for the verification contract hint
    #[serde(with = "template_keys")]
    pub templates: BTreeMap<u32, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd_index: Option<u32>,
}

/// Map keys travel as strings. The tagged enums below buffer their fields
/// before deserializing, and buffered JSON keys never coerce to integers.
mod template_keys {
    use std::collections::BTreeMap;

    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        templates: &BTreeMap<u32, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        templates
            .iter()
            .map(|(number, name)| (number.to_string(), name))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u32, String>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(number, name)| {
                number
                    .parse::<u32>()
                    .map(|number| (number, name))
                    .map_err(|_| D::Error::custom(format!("invalid template number {number:?}")))
            })
            .collect()
    }
}

/// Dispatcher to worker
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerRequest {
    Init {
        settings: Box<WorkerSettings>,
    },
    Job {
        job_id: JobId,
        payload: Box<JobPayload>,
    },
    Shutdown,
}

/// Worker to dispatcher
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerResponse {
    Ready,
    JobComplete {
        job_id: JobId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<JobResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<JobError>,
    },
    /// The worker was handed a job while another one was running
    Rejected { job_id: JobId, reason: String },
}

impl WorkerResponse {
    pub fn completed(job_id: JobId, outcome: Result<JobResult, JobError>) -> Self {
        match outcome {
            Ok(result) => WorkerResponse::JobComplete {
                job_id,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(error) => WorkerResponse::JobComplete {
                job_id,
                success: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Folds the `success` flag and the two optional fields back into one result
pub fn completion_into_result(
    success: bool,
    result: Option<JobResult>,
    error: Option<JobError>,
) -> Result<JobResult, JobError> {
    match (success, result, error) {
        (true, Some(result), _) => Ok(result),
        (false, _, Some(error)) => Err(error),
        (true, None, _) => Err(JobError::internal("worker reported success without a result")),
        (false, _, None) => Err(JobError::internal("worker reported failure without an error")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerificationOutcome;
    use serde_json::json;

    #[test]
    fn request_wire_format() {
        let line = serde_json::to_string(&WorkerRequest::Shutdown).unwrap();
        assert_eq!(line, r#"{"type":"shutdown"}"#);

        let request: WorkerRequest = serde_json::from_value(json!({
            "type": "job",
            "jobId": 3,
            "payload": {"chainName": "bsc", "deployedAddress": "0x5FbDB2315678afecb367f032d93F642f64180aa3"}
        }))
        .unwrap();
        match request {
            WorkerRequest::Job { job_id, payload } => {
                assert_eq!(job_id, JobId::new(3));
                assert_eq!(payload.chain_name, "bsc");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn completion_wire_format() {
        let result = JobResult {
            success: true,
            deployed_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap(),
            deployment_tx: None,
            network: "bsc".to_string(),
            verification_result: Some(VerificationOutcome::Verified),
        };
        let value =
            serde_json::to_value(WorkerResponse::completed(JobId::new(1), Ok(result))).unwrap();

        assert_eq!(value["type"], "jobComplete");
        assert_eq!(value["jobId"], 1);
        assert_eq!(value["success"], true);
        assert_eq!(value["result"]["verificationResult"], "success");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn init_with_templates_round_trips() {
        let settings = WorkerSettings {
            templates: BTreeMap::from([(0, "MemeToken".to_string()), (7, "CustomToken".to_string())]),
            ..Default::default()
        };
        let line = serde_json::to_string(&WorkerRequest::Init {
            settings: Box::new(settings),
        })
        .unwrap();
        assert!(line.contains(r#""templates":{"0":"MemeToken","7":"CustomToken"}"#));

        match serde_json::from_str::<WorkerRequest>(&line).unwrap() {
            WorkerRequest::Init { settings } => {
                assert_eq!(settings.templates.get(&0).map(String::as_str), Some("MemeToken"));
                assert_eq!(settings.templates.get(&7).map(String::as_str), Some("CustomToken"));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn init_rejects_non_numeric_template_key() {
        let err = serde_json::from_value::<WorkerRequest>(json!({
            "type": "init",
            "settings": {
                "networks": {},
                "verification": {},
                "templates": {"first": "MemeToken"}
            }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid template number"));
    }

    #[test]
    fn inconsistent_completion_is_internal_error() {
        assert!(matches!(
            completion_into_result(true, None, None),
            Err(JobError::Internal { .. })
        ));
        assert_eq!(
            completion_into_result(false, None, Some(JobError::ShuttingDown)),
            Err(JobError::ShuttingDown)
        );
    }
}
