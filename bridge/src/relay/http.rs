// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{RelayError, RelayNetwork, RelaySubmission, RelayTaskStatus, TaskId};
use async_trait::async_trait;
use ethers::types::H256;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    #[serde(flatten)]
    submission: &'a RelaySubmission,
    #[serde(skip_serializing_if = "Option::is_none")]
    sponsor_api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    task_id: TaskId,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    task: TaskState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskState {
    task_state: String,
    #[serde(default)]
    transaction_hash: Option<H256>,
    #[serde(default)]
    last_check_message: Option<String>,
}

impl TaskState {
    fn into_status(self) -> RelayTaskStatus {
        match self.task_state.as_str() {
            "ExecSuccess" => match self.transaction_hash {
                Some(tx_hash) => RelayTaskStatus::Done(tx_hash),
                None => RelayTaskStatus::Pending,
            },
            "ExecReverted" | "Cancelled" | "Blacklisted" => RelayTaskStatus::Failed(
                self.last_check_message
                    .unwrap_or_else(|| self.task_state.clone()),
            ),
            "NotFound" => RelayTaskStatus::NotFound,
            // CheckPending, ExecPending, WaitingForConfirmation
            _ => RelayTaskStatus::Pending,
        }
    }
}

/// Relay network reached over HTTP:
/// `POST {url}/relays/{chain_id}` to submit, `GET {url}/tasks/status/{task_id}` to poll.
pub struct HttpRelayNetwork {
    base_url: Url,
    api_key: Option<String>,
    client: Client,
}

impl HttpRelayNetwork {
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base_url.join(path).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl RelayNetwork for HttpRelayNetwork {
    async fn submit(&self, submission: &RelaySubmission) -> Result<TaskId, RelayError> {
        let url = self
            .endpoint(&format!("relays/{}", submission.chain_id))
            .map_err(RelayError::Submission)?;
        let body = SubmitBody {
            submission,
            sponsor_api_key: self.api_key.as_deref(),
        };
        let response: SubmitResponse = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RelayError::Submission(e.to_string()))?
            .json()
            .await
            .map_err(|e| RelayError::Submission(e.to_string()))?;
        Ok(response.task_id)
    }

    async fn poll(&self, task_id: &str) -> Result<RelayTaskStatus, RelayError> {
        let url = self
            .endpoint(&format!("tasks/status/{}", task_id))
            .map_err(RelayError::Poll)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Poll(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RelayTaskStatus::NotFound);
        }
        let status: StatusResponse = response
            .error_for_status()
            .map_err(|e| RelayError::Poll(e.to_string()))?
            .json()
            .await
            .map_err(|e| RelayError::Poll(e.to_string()))?;
        Ok(status.task.into_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, Bytes};

    fn parse(body: serde_json::Value) -> RelayTaskStatus {
        serde_json::from_value::<StatusResponse>(body)
            .unwrap()
            .task
            .into_status()
    }

    #[test]
    fn test_task_state_mapping() {
        let tx_hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(
            parse(serde_json::json!({"task": {"taskState": "ExecSuccess", "transactionHash": tx_hash}})),
            RelayTaskStatus::Done(H256::repeat_byte(0xab))
        );
        assert_eq!(
            parse(serde_json::json!({"task": {"taskState": "ExecPending"}})),
            RelayTaskStatus::Pending
        );
        assert_eq!(
            parse(serde_json::json!({"task": {"taskState": "ExecReverted", "lastCheckMessage": "teleport/expired"}})),
            RelayTaskStatus::Failed("teleport/expired".into())
        );
        assert_eq!(
            parse(serde_json::json!({"task": {"taskState": "Cancelled"}})),
            RelayTaskStatus::Failed("Cancelled".into())
        );
    }

    #[test]
    fn test_submit_body_shape() {
        let submission = RelaySubmission {
            chain_id: 10,
            target: Address::repeat_byte(1),
            data: Bytes::from(vec![0xde, 0xad]),
        };
        let body = serde_json::to_value(SubmitBody {
            submission: &submission,
            sponsor_api_key: Some("key"),
        })
        .unwrap();
        assert_eq!(body["chainId"], 10);
        assert_eq!(body["data"], "0xdead");
        assert_eq!(body["sponsorApiKey"], "key");
    }
}
