//! The `ssm` sink (spec §4.9): writes to SSM Parameter Store. Client
//! construction and `.context()`-style error handling follow
//! `backends/s3_rally/s3_rally_source.rs` and
//! `examples/estuary-flow/crates/iam-auth/src/providers/aws.rs`'s AWS SDK
//! idiom — `aws_config::defaults(BehaviorVersion::latest())...load()`,
//! `Client::new(&config)`, `ProvideErrorMetadata::code()/.message()` on the
//! raw `SdkError` without unwrapping into the service error first.

use async_trait::async_trait;
use aws_sdk_ssm::error::ProvideErrorMetadata;
use aws_sdk_ssm::types::{ParameterTier, ParameterType};

use crate::app_config::AwsOptions;
use crate::error::FailureReason;
use crate::model::{DispatchRecord, Outcome, PutOutcome};

use super::retry::{AwsOpError, RetryPolicy, retry_throttled};
use super::{Sink, ratelimiter::TokenBucket};

const TIER_PROMOTION_THRESHOLD_BYTES: usize = 4096;
const MAX_VALUE_BYTES: usize = 8192;

#[derive(Debug, Clone)]
pub struct SsmOptions {
    pub ssm_type: String,
    pub kms_key_id: Option<String>,
    pub overwrite: bool,
}

pub struct SsmSink {
    client: aws_sdk_ssm::Client,
    options: SsmOptions,
    limiter: TokenBucket,
}

impl SsmSink {
    pub async fn new(options: SsmOptions, aws: &AwsOptions, rate_limit_rps: f64) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &aws.region {
            loader = loader.region(aws_sdk_ssm::config::Region::new(region.clone()));
        }
        if let Some(profile) = &aws.profile {
            loader = loader.profile_name(profile.clone());
        }
        let shared_config = loader.load().await;
        Ok(Self {
            client: aws_sdk_ssm::Client::new(&shared_config),
            options,
            limiter: TokenBucket::new(rate_limit_rps),
        })
    }
}

#[async_trait]
impl Sink for SsmSink {
    async fn put(&self, record: &DispatchRecord) -> PutOutcome {
        let value_len = record.value.as_bytes().len();
        if value_len > MAX_VALUE_BYTES {
            return PutOutcome { outcome: Outcome::Failed(FailureReason::TooLarge), previous_value: None };
        }

        self.limiter.acquire().await;
        let existing = match self
            .client
            .get_parameter()
            .name(&record.full_name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(resp) => resp.parameter.and_then(|p| p.value),
            // a not-found response implies created; a permission error is
            // treated as unknown and we proceed to write (spec §4.9)
            Err(_) => None,
        };

        if let Some(current_value) = &existing {
            if current_value == &record.value {
                return PutOutcome { outcome: Outcome::Unchanged, previous_value: existing };
            }
            if !self.options.overwrite {
                return PutOutcome { outcome: Outcome::Failed(FailureReason::Exists), previous_value: existing };
            }
        }

        let tier = if value_len > TIER_PROMOTION_THRESHOLD_BYTES {
            tracing::warn!(name = %record.full_name, "value exceeds 4096 bytes, promoting SSM tier to Advanced");
            ParameterTier::Advanced
        } else {
            ParameterTier::Standard
        };

        let parameter_type = if self.options.ssm_type == "String" {
            ParameterType::String
        } else {
            ParameterType::SecureString
        };

        let overwrite = existing.is_some();
        let final_outcome = if overwrite { Outcome::Changed } else { Outcome::Created };

        let policy = RetryPolicy::default();
        let result = retry_throttled(&policy, || async {
            self.limiter.acquire().await;
            let mut request = self
                .client
                .put_parameter()
                .name(&record.full_name)
                .value(&record.value)
                .overwrite(overwrite)
                .tier(tier.clone())
                .r#type(parameter_type.clone());
            if parameter_type == ParameterType::SecureString {
                if let Some(kms_key_id) = &self.options.kms_key_id {
                    request = request.key_id(kms_key_id);
                }
            }
            request.send().await.map(|_| ()).map_err(classify_put_error)
        })
        .await;

        let outcome = match result {
            Ok(()) => final_outcome,
            Err(err) => Outcome::Failed(FailureReason::Aws(err.message)),
        };
        PutOutcome { outcome, previous_value: existing }
    }
}

fn classify_put_error(err: impl ProvideErrorMetadata + std::fmt::Display) -> AwsOpError {
    let code = err.code().unwrap_or_default();
    let is_throttling = code.contains("Throttl") || code == "TooManyUpdates";
    AwsOpError {
        is_throttling,
        message: err.message().unwrap_or(&err.to_string()).to_string(),
    }
}
