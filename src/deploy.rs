//! Creates or updates the stack in CloudFormation and waits for it to settle.

use std::collections::HashMap;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::types::{Capability, OnFailure, Stack, StackStatus};
use aws_sdk_cloudformation::Client;

use crate::cfn::Template;
use crate::error::{Error, Result};

const POLL_INTERVAL_MS: u64 = 700;
const MAX_WAIT_S: u64 = 60 * 60;

/// deploys `template` as `stack_name` and returns the stack outputs.
pub async fn deploy(stack_name: &str, region: &str, template: &Template) -> Result<HashMap<String, String>> {
    let shared_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    let client = Client::new(&shared_config);

    // pretty so if someone needs to look at the stack in the console, it looks nice
    let body = template.to_json_pretty()?;
    let fail = |reason: String| Error::Deploy { stack: stack_name.to_string(), reason };

    create_or_update_stack(&client, stack_name, &body).await.map_err(fail)?;
    let outputs = wait_for_output(&client, stack_name).await.map_err(fail)?;
    for (key, value) in outputs.iter() {
        tracing::info!(stack = stack_name, %key, %value, "stack output");
    }
    Ok(outputs)
}

pub async fn does_stack_exist(client: &Client, name: &str) -> std::result::Result<bool, String> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(_) => Ok(true),
        Err(e) => {
            let e_str = format!("{:#?}", e);
            if e_str.contains("does not exist") {
                return Ok(false);
            }
            Err(e_str)
        }
    }
}

/// where a stack is, as far as a deploy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackProgress {
    Done,
    InProgress,
    /// rolled back, deleted, or failed outright. a rollback that completes
    /// means the deploy did not happen.
    Failed,
}

pub fn classify(status: &StackStatus) -> StackProgress {
    match status {
        StackStatus::CreateComplete |
        StackStatus::UpdateComplete |
        StackStatus::ImportComplete => StackProgress::Done,

        StackStatus::CreateInProgress |
        StackStatus::DeleteInProgress |
        StackStatus::ImportInProgress |
        StackStatus::ImportRollbackInProgress |
        StackStatus::ReviewInProgress |
        StackStatus::RollbackInProgress |
        StackStatus::UpdateCompleteCleanupInProgress |
        StackStatus::UpdateInProgress |
        StackStatus::UpdateRollbackCompleteCleanupInProgress |
        StackStatus::UpdateRollbackInProgress => StackProgress::InProgress,

        _ => StackProgress::Failed,
    }
}

/// `Ok(None)` while the stack is still in progress.
pub async fn describe_stack(client: &Client, name: &str) -> std::result::Result<Option<Stack>, String> {
    let resp = client.describe_stacks().stack_name(name).send().await
        .map_err(|e| format!("{:#?}", e))?;
    let first = resp.stacks().first().ok_or_else(|| format!("Stack {name} not found"))?;
    let status = first.stack_status().ok_or_else(|| format!("Stack {name} not found"))?;
    match classify(status) {
        StackProgress::Done => Ok(Some(first.clone())),
        StackProgress::InProgress => Ok(None),
        StackProgress::Failed => {
            let reason = first.stack_status_reason().unwrap_or("Failed to get stack failure reason");
            Err(format!("Stack {name} ended in {}: {reason}", status.as_str()))
        }
    }
}

/// polls until the stack settles, giving up after `MAX_WAIT_S`.
pub async fn wait_for_output(client: &Client, name: &str) -> std::result::Result<HashMap<String, String>, String> {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(MAX_WAIT_S);
    loop {
        tokio::time::sleep(tokio::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
        match describe_stack(client, name).await? {
            Some(stack) => {
                let out = stack.outputs().iter()
                    .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
                    .collect();
                return Ok(out);
            }
            None if tokio::time::Instant::now() >= deadline => {
                return Err(format!("Stack {name} still in progress after {MAX_WAIT_S}s"));
            }
            None => tracing::debug!(stack = name, "still waiting"),
        }
    }
}

pub async fn create_or_update_stack(client: &Client, name: &str, body: &str) -> std::result::Result<(), String> {
    if does_stack_exist(client, name).await? {
        tracing::info!(stack = name, "updating");
        let res = client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await;
        if let Err(e) = res {
            let e_str = format!("{:#?}", e);
            if e_str.contains("No updates are to be performed") {
                tracing::info!(stack = name, "no changes");
                return Ok(());
            }
            return Err(e_str);
        }
    } else {
        tracing::info!(stack = name, "creating");
        client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await
            .map_err(|e| format!("{:#?}", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_completions_count_as_done() {
        let table = [
            (StackStatus::CreateComplete, StackProgress::Done),
            (StackStatus::UpdateComplete, StackProgress::Done),
            (StackStatus::ImportComplete, StackProgress::Done),
            (StackStatus::CreateInProgress, StackProgress::InProgress),
            (StackStatus::UpdateInProgress, StackProgress::InProgress),
            (StackStatus::UpdateCompleteCleanupInProgress, StackProgress::InProgress),
            (StackStatus::UpdateRollbackInProgress, StackProgress::InProgress),
            (StackStatus::RollbackInProgress, StackProgress::InProgress),
            (StackStatus::UpdateRollbackComplete, StackProgress::Failed),
            (StackStatus::RollbackComplete, StackProgress::Failed),
            (StackStatus::ImportRollbackComplete, StackProgress::Failed),
            (StackStatus::DeleteComplete, StackProgress::Failed),
            (StackStatus::CreateFailed, StackProgress::Failed),
            (StackStatus::UpdateRollbackFailed, StackProgress::Failed),
            (StackStatus::from("SOMETHING_NEW"), StackProgress::Failed),
        ];
        for (status, expected) in table {
            assert_eq!(classify(&status), expected, "{status:?}");
        }
    }
}
