//! The `secrets_manager` sink (spec §4.9): writes to AWS Secrets Manager.
//! Client construction and retry idiom mirror `sinks/ssm.rs` (itself grounded
//! on `backends/s3_rally/s3_rally_source.rs` and
//! `examples/estuary-flow/crates/iam-auth/src/providers/aws.rs`'s AWS SDK
//! usage pattern).

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::ProvideErrorMetadata;

use crate::app_config::AwsOptions;
use crate::error::FailureReason;
use crate::model::{DispatchRecord, Outcome, PutOutcome};

use super::retry::{AwsOpError, RetryPolicy, retry_throttled};
use super::{Sink, ratelimiter::TokenBucket};

#[derive(Debug, Clone)]
pub struct SecretsManagerOptions {
    pub kms_key_id: Option<String>,
    pub overwrite: bool,
}

pub struct SecretsManagerSink {
    client: aws_sdk_secretsmanager::Client,
    options: SecretsManagerOptions,
    limiter: TokenBucket,
}

impl SecretsManagerSink {
    pub async fn new(options: SecretsManagerOptions, aws: &AwsOptions, rate_limit_rps: f64) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &aws.region {
            loader = loader.region(aws_sdk_secretsmanager::config::Region::new(region.clone()));
        }
        if let Some(profile) = &aws.profile {
            loader = loader.profile_name(profile.clone());
        }
        let shared_config = loader.load().await;
        Ok(Self {
            client: aws_sdk_secretsmanager::Client::new(&shared_config),
            options,
            limiter: TokenBucket::new(rate_limit_rps),
        })
    }
}

/// Current state of an existing secret, enough to classify the outcome
/// (spec §4.9's table plus Open Question #2: description-only differences
/// count as `changed`, per DESIGN.md).
struct Existing {
    value: Option<String>,
    description: Option<String>,
}

#[async_trait]
impl Sink for SecretsManagerSink {
    async fn put(&self, record: &DispatchRecord) -> PutOutcome {
        self.limiter.acquire().await;
        let existing = match self
            .client
            .get_secret_value()
            .secret_id(&record.full_name)
            .send()
            .await
        {
            Ok(resp) => Some(Existing {
                value: resp.secret_string,
                description: describe(&self.client, &record.full_name).await,
            }),
            // not-found implies created; a permission error is unknown and we
            // proceed to write (spec §4.9)
            Err(_) => None,
        };
        let previous_value = existing.as_ref().and_then(|e| e.value.clone());

        if let Some(current) = &existing {
            let unchanged = current.value.as_deref() == Some(record.value.as_str())
                && current.description.as_deref() == record.description.as_deref();
            if unchanged {
                return PutOutcome { outcome: Outcome::Unchanged, previous_value };
            }
            if !self.options.overwrite {
                return PutOutcome { outcome: Outcome::Failed(FailureReason::Exists), previous_value };
            }
        }

        let creating = existing.is_none();
        let final_outcome = if creating { Outcome::Created } else { Outcome::Changed };

        let policy = RetryPolicy::default();
        let result = retry_throttled(&policy, || async {
            self.limiter.acquire().await;
            if creating {
                let mut request = self
                    .client
                    .create_secret()
                    .name(&record.full_name)
                    .secret_string(&record.value);
                if let Some(description) = &record.description {
                    request = request.description(description);
                }
                if let Some(kms_key_id) = &self.options.kms_key_id {
                    request = request.kms_key_id(kms_key_id);
                }
                request.send().await.map(|_| ()).map_err(classify_error)
            } else {
                self.client
                    .put_secret_value()
                    .secret_id(&record.full_name)
                    .secret_string(&record.value)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(classify_error)
            }
        })
        .await;

        let outcome = match result {
            Ok(()) => final_outcome,
            Err(err) => Outcome::Failed(FailureReason::Aws(err.message)),
        };
        PutOutcome { outcome, previous_value }
    }
}

async fn describe(client: &aws_sdk_secretsmanager::Client, secret_id: &str) -> Option<String> {
    client
        .describe_secret()
        .secret_id(secret_id)
        .send()
        .await
        .ok()
        .and_then(|resp| resp.description)
}

fn classify_error(err: impl ProvideErrorMetadata + std::fmt::Display) -> AwsOpError {
    let code = err.code().unwrap_or_default();
    let is_throttling = code.contains("Throttl") || code == "TooManyRequestsException";
    AwsOpError {
        is_throttling,
        message: err.message().unwrap_or(&err.to_string()).to_string(),
    }
}
