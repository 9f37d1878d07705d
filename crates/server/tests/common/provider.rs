//! Scriptable Provider double used by the integration tests.

use async_trait::async_trait;
use basin_core::instance::{Instance, User};
use basin_core::plan::Plan;
use basin_provider::{Provider, ProviderError, ProviderResult};
use std::sync::Mutex;

#[derive(Debug)]
struct MockState {
    status: String,
    ready: bool,
    fail_provision: bool,
    fail_deprovision: bool,
    feature_unavailable_on_modify: bool,
    provision_calls: usize,
    deprovision_calls: usize,
    post_provision_calls: usize,
    rotate_calls: usize,
    tags: Vec<(String, String, String)>,
    untags: Vec<(String, String)>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            status: "available".to_string(),
            ready: true,
            fail_provision: false,
            fail_deprovision: false,
            feature_unavailable_on_modify: false,
            provision_calls: 0,
            deprovision_calls: 0,
            post_provision_calls: 0,
            rotate_calls: 0,
            tags: Vec::new(),
            untags: Vec::new(),
        }
    }
}

/// A provider double reporting a configurable status.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status (and readiness) the backend reports from now on.
    pub fn set_status(&self, status: &str, ready: bool) {
        let mut state = self.state.lock().unwrap();
        state.status = status.to_string();
        state.ready = ready;
    }

    pub fn set_fail_provision(&self, fail: bool) {
        self.state.lock().unwrap().fail_provision = fail;
    }

    pub fn set_fail_deprovision(&self, fail: bool) {
        self.state.lock().unwrap().fail_deprovision = fail;
    }

    pub fn set_feature_unavailable_on_modify(&self, value: bool) {
        self.state.lock().unwrap().feature_unavailable_on_modify = value;
    }

    pub fn provision_calls(&self) -> usize {
        self.state.lock().unwrap().provision_calls
    }

    pub fn deprovision_calls(&self) -> usize {
        self.state.lock().unwrap().deprovision_calls
    }

    pub fn post_provision_calls(&self) -> usize {
        self.state.lock().unwrap().post_provision_calls
    }

    pub fn tags(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().tags.clone()
    }

    pub fn untags(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().untags.clone()
    }

    fn instance(&self, name: &str, plan: &Plan, state: &MockState) -> Instance {
        Instance {
            id: String::new(),
            name: name.to_string(),
            provider_id: format!("arn:aws:iam::000000000000:user/{name}"),
            plan: plan.clone(),
            username: String::new(),
            password: String::new(),
            endpoint: String::new(),
            status: state.status.clone(),
            ready: state.ready,
            engine: "s3".to_string(),
            engine_version: "aws-1".to_string(),
            scheme: "s3".to_string(),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn get_instance(&self, name: &str, plan: &Plan) -> ProviderResult<Instance> {
        let state = self.state.lock().unwrap();
        Ok(self.instance(name, plan, &state))
    }

    async fn provision(&self, id: &str, plan: &Plan, _owner: &str) -> ProviderResult<Instance> {
        let mut state = self.state.lock().unwrap();
        if state.fail_provision {
            return Err(ProviderError::Unsupported(
                "mock provision failure".to_string(),
            ));
        }
        state.provision_calls += 1;
        let count = state.provision_calls;
        let name = format!("basin-test-u{count:08x}");
        let mut instance = self.instance(&name, plan, &state);
        instance.id = id.to_string();
        instance.username = format!("AKIAMOCK{count:08}");
        instance.password = format!("mock-secret-{count}");
        instance.endpoint = format!("{name}.s3.amazonaws.com");
        Ok(instance)
    }

    async fn deprovision(&self, _instance: &Instance, _take_snapshot: bool) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deprovision {
            return Err(ProviderError::Unsupported(
                "mock deprovision failure".to_string(),
            ));
        }
        state.deprovision_calls += 1;
        Ok(())
    }

    async fn modify(&self, instance: &Instance, plan: &Plan) -> ProviderResult<Instance> {
        let state = self.state.lock().unwrap();
        if state.feature_unavailable_on_modify {
            return Err(ProviderError::FeatureUnavailable);
        }
        let mut modified = self.instance(&instance.name, plan, &state);
        modified.id = instance.id.clone();
        modified.username = instance.username.clone();
        modified.password = instance.password.clone();
        modified.endpoint = instance.endpoint.clone();
        Ok(modified)
    }

    async fn tag(&self, instance: &Instance, name: &str, value: &str) -> ProviderResult<()> {
        self.state.lock().unwrap().tags.push((
            instance.name.clone(),
            name.to_string(),
            value.to_string(),
        ));
        Ok(())
    }

    async fn untag(&self, instance: &Instance, name: &str) -> ProviderResult<()> {
        self.state
            .lock()
            .unwrap()
            .untags
            .push((instance.name.clone(), name.to_string()));
        Ok(())
    }

    async fn rotate_credentials(&self, instance: &Instance) -> ProviderResult<User> {
        let mut state = self.state.lock().unwrap();
        state.rotate_calls += 1;
        let count = state.rotate_calls;
        Ok(User {
            arn: instance.provider_id.clone(),
            username: instance.name.clone(),
            access_key_id: format!("AKIAROTATED{count:08}"),
            secret_access_key: format!("rotated-secret-{count}"),
        })
    }

    async fn perform_post_provision(&self, instance: &Instance) -> ProviderResult<Instance> {
        self.state.lock().unwrap().post_provision_calls += 1;
        Ok(instance.clone())
    }

    fn get_url(&self, instance: &Instance) -> serde_json::Value {
        serde_json::json!({
            "S3_BUCKET": instance.name,
            "S3_LOCATION": instance.endpoint,
            "S3_ACCESS_KEY": instance.username,
            "S3_SECRET_KEY": instance.password,
            "S3_REGION": "us-west-2",
        })
    }
}
