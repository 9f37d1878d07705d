//! AWS S3 + IAM provider.
//!
//! Every instance is a bucket plus a dedicated IAM user, one access key, a
//! user policy scoped to the bucket, and a bucket policy granting the user.
//! Bucket name and IAM user name are always identical.

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{Provider, S3Settings};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, BucketLocationConstraint, BucketVersioningStatus,
    CreateBucketConfiguration, ExpirationStatus, LifecycleRule, LifecycleRuleFilter,
    NoncurrentVersionExpiration, NoncurrentVersionTransition, ServerSideEncryption,
    ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration, ServerSideEncryptionRule,
    Tag, Tagging, Transition, TransitionStorageClass, VersioningConfiguration,
};
use basin_core::instance::{Instance, User};
use basin_core::plan::Plan;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// How long IAM principal propagation is given before the new user ARN is
/// referenced from bucket policies.
const IAM_PROPAGATION_WAIT: Duration = Duration::from_secs(10);

/// Lifetime of the get_instance read cache.
const INSTANCE_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct UserPolicyStatement {
    #[serde(rename = "Resource")]
    resource: Vec<String>,
    #[serde(rename = "Action")]
    action: Vec<String>,
    #[serde(rename = "Effect")]
    effect: String,
}

#[derive(Debug, Serialize)]
struct UserPolicy {
    #[serde(rename = "Statement")]
    statement: Vec<UserPolicyStatement>,
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Debug, Serialize)]
struct BucketPolicyStatement {
    #[serde(rename = "Sid")]
    sid: String,
    #[serde(rename = "Effect")]
    effect: String,
    #[serde(rename = "Principal")]
    principal: Principal,
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Resource")]
    resource: String,
}

#[derive(Debug, Serialize)]
struct Principal {
    #[serde(rename = "AWS")]
    aws: String,
}

#[derive(Debug, Serialize)]
struct BucketPolicy {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Statement")]
    statement: Vec<BucketPolicyStatement>,
}

fn cloud_err<E>(err: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::Cloud(Box::new(err))
}

/// AWS S3 bucket provider.
pub struct AwsS3Provider {
    s3: aws_sdk_s3::Client,
    iam: aws_sdk_iam::Client,
    name_prefix: String,
    region: String,
    /// Soft read cache for get_instance, wiped every few seconds. A latency
    /// trick only; state-changing operations never consult it.
    instance_cache: Arc<Mutex<HashMap<String, Instance>>>,
}

impl AwsS3Provider {
    /// Build the provider and start the cache-wipe loop.
    pub async fn new(name_prefix: &str, region: &str) -> ProviderResult<Self> {
        if region.is_empty() {
            return Err(ProviderError::Config(
                "AWS_REGION is not set; the aws-s3 provider requires a region".to_string(),
            ));
        }
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let instance_cache: Arc<Mutex<HashMap<String, Instance>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let cache = instance_cache.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(INSTANCE_CACHE_TTL);
            loop {
                tick.tick().await;
                cache.lock().expect("instance cache poisoned").clear();
            }
        });

        Ok(Self {
            s3: aws_sdk_s3::Client::new(&shared),
            iam: aws_sdk_iam::Client::new(&shared),
            name_prefix: name_prefix.to_string(),
            region: region.to_string(),
            instance_cache,
        })
    }

    /// Generate a bucket/user name: prefix plus the first segment of a v4
    /// uuid.
    fn create_random_name(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let segment = id.split('-').next().unwrap_or("00000000");
        format!("{}-u{}", self.name_prefix, segment)
    }

    async fn create_user(&self, user_name: &str) -> ProviderResult<User> {
        let created = self
            .iam
            .create_user()
            .user_name(user_name)
            .send()
            .await
            .map_err(cloud_err)?;
        let arn = created
            .user()
            .map(|u| u.arn().to_string())
            .ok_or_else(|| ProviderError::Config("IAM returned no user".to_string()))?;

        let key = self
            .iam
            .create_access_key()
            .user_name(user_name)
            .send()
            .await
            .map_err(cloud_err)?;
        let key = key
            .access_key()
            .ok_or_else(|| ProviderError::Config("IAM returned no access key".to_string()))?;

        Ok(User {
            arn,
            username: user_name.to_string(),
            access_key_id: key.access_key_id().to_string(),
            secret_access_key: key.secret_access_key().to_string(),
        })
    }

    async fn delete_access_keys(&self, user_name: &str) -> ProviderResult<()> {
        let keys = self
            .iam
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(cloud_err)?;
        for metadata in keys.access_key_metadata() {
            if let Some(key_id) = metadata.access_key_id() {
                self.iam
                    .delete_access_key()
                    .user_name(user_name)
                    .access_key_id(key_id)
                    .send()
                    .await
                    .map_err(cloud_err)?;
            }
        }
        Ok(())
    }

    async fn get_policy_arn(&self, user_name: &str) -> ProviderResult<String> {
        let attached = self
            .iam
            .list_attached_user_policies()
            .user_name(user_name)
            .send()
            .await
            .map_err(cloud_err)?;
        attached
            .attached_policies()
            .first()
            .and_then(|p| p.policy_arn())
            .map(|arn| arn.to_string())
            .ok_or_else(|| {
                ProviderError::Config(format!("no policy attached to IAM user {user_name}"))
            })
    }

    async fn detach_user_policy(&self, user_name: &str) -> ProviderResult<()> {
        let policy_arn = self.get_policy_arn(user_name).await?;
        self.iam
            .detach_user_policy()
            .user_name(user_name)
            .policy_arn(&policy_arn)
            .send()
            .await
            .map_err(cloud_err)?;
        self.iam
            .delete_policy()
            .policy_arn(&policy_arn)
            .send()
            .await
            .map_err(cloud_err)?;
        Ok(())
    }

    async fn create_user_policy(&self, user_name: &str, bucket: &str) -> ProviderResult<String> {
        let policy = UserPolicy {
            version: "2012-10-17".to_string(),
            statement: vec![UserPolicyStatement {
                effect: "Allow".to_string(),
                resource: vec![
                    format!("arn:aws:s3:::{bucket}/*"),
                    format!("arn:aws:s3:::{bucket}"),
                ],
                action: vec!["s3:*".to_string()],
            }],
        };
        let created = self
            .iam
            .create_policy()
            .policy_name(format!("{user_name}policy"))
            .policy_document(serde_json::to_string(&policy)?)
            .send()
            .await
            .map_err(cloud_err)?;
        created
            .policy()
            .and_then(|p| p.arn())
            .map(|arn| arn.to_string())
            .ok_or_else(|| ProviderError::Config("IAM returned no policy".to_string()))
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.iam
            .attach_user_policy()
            .user_name(user_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(cloud_err)?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, settings: &S3Settings) -> ProviderResult<String> {
        let mut request = self.s3.create_bucket().bucket(bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        let created = request.send().await.map_err(cloud_err)?;
        let endpoint = created
            .location()
            .unwrap_or_default()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .replace('/', "");

        if settings.versioned {
            self.s3
                .put_bucket_versioning()
                .bucket(bucket)
                .versioning_configuration(
                    VersioningConfiguration::builder()
                        .status(BucketVersioningStatus::Enabled)
                        .build(),
                )
                .send()
                .await
                .map_err(cloud_err)?;

            let rule = LifecycleRule::builder()
                .id("versioned")
                .status(ExpirationStatus::Enabled)
                .filter(LifecycleRuleFilter::builder().prefix("").build())
                .transitions(
                    Transition::builder()
                        .days(30)
                        .storage_class(TransitionStorageClass::StandardIa)
                        .build(),
                )
                .noncurrent_version_transitions(
                    NoncurrentVersionTransition::builder()
                        .noncurrent_days(30)
                        .storage_class(TransitionStorageClass::StandardIa)
                        .build(),
                )
                .noncurrent_version_expiration(
                    NoncurrentVersionExpiration::builder()
                        .noncurrent_days(180)
                        .build(),
                )
                .build()
                .map_err(cloud_err)?;
            self.s3
                .put_bucket_lifecycle_configuration()
                .bucket(bucket)
                .lifecycle_configuration(
                    BucketLifecycleConfiguration::builder()
                        .rules(rule)
                        .build()
                        .map_err(cloud_err)?,
                )
                .send()
                .await
                .map_err(cloud_err)?;
        }

        if settings.encrypted && !settings.kms_key_id.is_empty() {
            let rule = ServerSideEncryptionRule::builder()
                .apply_server_side_encryption_by_default(
                    ServerSideEncryptionByDefault::builder()
                        .sse_algorithm(ServerSideEncryption::AwsKms)
                        .kms_master_key_id(&settings.kms_key_id)
                        .build()
                        .map_err(cloud_err)?,
                )
                .build();
            self.s3
                .put_bucket_encryption()
                .bucket(bucket)
                .server_side_encryption_configuration(
                    ServerSideEncryptionConfiguration::builder()
                        .rules(rule)
                        .build()
                        .map_err(cloud_err)?,
                )
                .send()
                .await
                .map_err(cloud_err)?;
        }

        Ok(endpoint)
    }

    async fn add_bucket_policy(&self, bucket: &str, user_arn: &str) -> ProviderResult<()> {
        let policy = BucketPolicy {
            version: "2012-10-17".to_string(),
            id: "BasinBucketPolicy".to_string(),
            statement: vec![BucketPolicyStatement {
                sid: "BasinBucketAccess".to_string(),
                effect: "Allow".to_string(),
                principal: Principal {
                    aws: user_arn.to_string(),
                },
                action: "s3:*".to_string(),
                resource: format!("arn:aws:s3:::{bucket}/*"),
            }],
        };
        self.s3
            .put_bucket_policy()
            .bucket(bucket)
            .policy(serde_json::to_string(&policy)?)
            .send()
            .await
            .map_err(cloud_err)?;
        Ok(())
    }

    /// Current bucket tag set. Buckets without tags report an error from
    /// the API; that case is an empty set.
    async fn get_tags(&self, bucket: &str) -> Vec<Tag> {
        match self.s3.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => output.tag_set().to_vec(),
            Err(_) => Vec::new(),
        }
    }

    async fn put_tags(&self, bucket: &str, tags: Vec<Tag>) -> ProviderResult<()> {
        self.s3
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(
                Tagging::builder()
                    .set_tag_set(Some(tags))
                    .build()
                    .map_err(cloud_err)?,
            )
            .send()
            .await
            .map_err(cloud_err)?;
        Ok(())
    }

    fn instance_from_parts(&self, name: &str, plan: &Plan, provider_id: String) -> Instance {
        Instance {
            // The provider does not know durable ids or credentials; the
            // caller merges those from the store.
            id: String::new(),
            name: name.to_string(),
            provider_id,
            plan: plan.clone(),
            username: String::new(),
            password: String::new(),
            endpoint: String::new(),
            status: "available".to_string(),
            ready: true,
            engine: "s3".to_string(),
            engine_version: "aws-1".to_string(),
            scheme: "s3".to_string(),
        }
    }
}

#[async_trait]
impl Provider for AwsS3Provider {
    async fn get_instance(&self, name: &str, plan: &Plan) -> ProviderResult<Instance> {
        let cache_key = format!("{name}{}", plan.id);
        if let Some(cached) = self
            .instance_cache
            .lock()
            .expect("instance cache poisoned")
            .get(&cache_key)
        {
            return Ok(cached.clone());
        }

        let arn = self.get_policy_arn(name).await?;
        let instance = self.instance_from_parts(name, plan, arn);
        self.instance_cache
            .lock()
            .expect("instance cache poisoned")
            .insert(cache_key, instance.clone());
        Ok(instance)
    }

    async fn provision(&self, id: &str, plan: &Plan, owner: &str) -> ProviderResult<Instance> {
        let settings = S3Settings::from_plan(plan)?;
        let name = self.create_random_name();

        let user = self.create_user(&name).await?;
        let endpoint = self.create_bucket(&user.username, &settings).await?;

        let mut instance = self.instance_from_parts(&name, plan, user.arn.clone());
        instance.id = id.to_string();
        instance.username = user.access_key_id.clone();
        instance.password = user.secret_access_key.clone();
        instance.endpoint = endpoint;

        // The freshly created principal is not immediately referenceable
        // from bucket policies.
        tokio::time::sleep(IAM_PROPAGATION_WAIT).await;

        self.tag(&instance, "billingcode", owner).await?;
        self.add_bucket_policy(&user.username, &user.arn).await?;
        let policy_arn = self
            .create_user_policy(&user.username, &user.username)
            .await?;
        self.attach_user_policy(&user.username, &policy_arn).await?;

        Ok(instance)
    }

    async fn deprovision(&self, instance: &Instance, _take_snapshot: bool) -> ProviderResult<()> {
        self.s3
            .delete_bucket()
            .bucket(&instance.name)
            .send()
            .await
            .map_err(cloud_err)?;
        self.detach_user_policy(&instance.name).await?;
        self.delete_access_keys(&instance.name).await?;
        self.iam
            .delete_user()
            .user_name(&instance.name)
            .send()
            .await
            .map_err(cloud_err)?;
        Ok(())
    }

    async fn modify(&self, _instance: &Instance, _plan: &Plan) -> ProviderResult<Instance> {
        Err(ProviderError::Unsupported(
            "S3 buckets cannot be modified, only created or destroyed".to_string(),
        ))
    }

    async fn tag(&self, instance: &Instance, name: &str, value: &str) -> ProviderResult<()> {
        let mut tags = self.get_tags(&instance.name).await;
        tags.push(Tag::builder().key(name).value(value).build().map_err(cloud_err)?);
        self.put_tags(&instance.name, tags).await
    }

    async fn untag(&self, instance: &Instance, name: &str) -> ProviderResult<()> {
        let tags = self
            .get_tags(&instance.name)
            .await
            .into_iter()
            .filter(|tag| tag.key() != name)
            .collect();
        self.put_tags(&instance.name, tags).await
    }

    async fn rotate_credentials(&self, instance: &Instance) -> ProviderResult<User> {
        let user = self
            .iam
            .get_user()
            .user_name(&instance.name)
            .send()
            .await
            .map_err(cloud_err)?;
        let arn = user
            .user()
            .map(|u| u.arn().to_string())
            .ok_or_else(|| ProviderError::Config("IAM returned no user".to_string()))?;

        self.delete_access_keys(&instance.name).await?;

        let key = self
            .iam
            .create_access_key()
            .user_name(&instance.name)
            .send()
            .await
            .map_err(cloud_err)?;
        let key = key
            .access_key()
            .ok_or_else(|| ProviderError::Config("IAM returned no access key".to_string()))?;

        Ok(User {
            arn,
            username: instance.name.clone(),
            access_key_id: key.access_key_id().to_string(),
            secret_access_key: key.secret_access_key().to_string(),
        })
    }

    async fn perform_post_provision(&self, instance: &Instance) -> ProviderResult<Instance> {
        Ok(instance.clone())
    }

    fn get_url(&self, instance: &Instance) -> serde_json::Value {
        serde_json::json!({
            "S3_BUCKET": instance.name,
            "S3_LOCATION": instance.endpoint,
            "S3_ACCESS_KEY": instance.username,
            "S3_SECRET_KEY": instance.password,
            "S3_REGION": self.region,
        })
    }
}
