use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const APP_NAME_LABEL: &str = "routewatch.io/app-name";
pub const APP_POOL_LABEL: &str = "routewatch.io/app-pool";
pub const IS_DEPLOY_LABEL: &str = "routewatch.io/is-deploy";
pub const IS_ISOLATED_RUN_LABEL: &str = "routewatch.io/is-isolated-run";

/// Routing-relevant identity read from a pod's labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            labels: meta.labels.clone().unwrap_or_default(),
        }
    }

    /// Empty when the pod does not belong to an application
    pub fn app_name(&self) -> &str {
        self.get(APP_NAME_LABEL)
    }

    pub fn app_pool(&self) -> &str {
        self.get(APP_POOL_LABEL)
    }

    pub fn is_deploy(&self) -> bool {
        self.flag(IS_DEPLOY_LABEL)
    }

    pub fn is_isolated_run(&self) -> bool {
        self.flag(IS_ISOLATED_RUN_LABEL)
    }

    fn get(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or_default()
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).parse().unwrap_or(false)
    }
}
