//! An in-memory [`ControllerClient`] used by this workspace's own tests.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Config, ControllerClient};

/// Serves a fixed, ordered sequence of configurations, `configs[i].num == i`.
/// Tests advance the cluster by pushing a new configuration onto it.
pub struct StaticController {
    configs: RwLock<Vec<Config>>,
}

impl StaticController {
    pub fn new(initial: Config) -> Self {
        assert_eq!(initial.num, 0, "the first configuration must be epoch 0");
        Self {
            configs: RwLock::new(vec![initial]),
        }
    }

    /// Publish the next configuration. Its `num` must be exactly one past
    /// the current latest, matching the controller's own numbering rule.
    pub async fn advance(&self, next: Config) {
        let mut configs = self.configs.write().await;
        assert_eq!(next.num, configs.len() as u64, "configurations must be published in order");
        configs.push(next);
    }

    pub async fn latest_num(&self) -> u64 {
        self.configs.read().await.len() as u64 - 1
    }
}

#[async_trait]
impl ControllerClient for StaticController {
    async fn query(&self, num: i64) -> Config {
        let configs = self.configs.read().await;
        let index = if num < 0 {
            configs.len() - 1
        } else {
            (num as usize).min(configs.len() - 1)
        };
        configs[index].clone()
    }
}
