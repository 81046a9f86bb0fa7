//! Discovery — pages through the compute service for stopped instances.

use std::sync::Arc;

use tracing::{debug, info};

use reclaim_core::{ComputeGateway, Instance, InstanceLifecycle, InstanceQuery};

use crate::error::{SweepError, SweepResult};

pub struct Discovery {
    compute: Arc<dyn ComputeGateway>,
    page_size: i32,
}

impl Discovery {
    pub fn new(compute: Arc<dyn ComputeGateway>, page_size: i32) -> Self {
        Self { compute, page_size }
    }

    /// All stopped instances, in the order the service returned them.
    ///
    /// Follows continuation tokens until the service reports none (an empty
    /// token counts as none). Any page failure aborts the listing and no
    /// partial result is returned.
    pub async fn list_stopped_instances(&self) -> SweepResult<Vec<Instance>> {
        let mut query = InstanceQuery {
            state: InstanceLifecycle::Stopped,
            page_size: self.page_size,
            next_token: None,
        };
        let mut result = Vec::new();
        let mut pages = 0u32;

        loop {
            let page = self
                .compute
                .list_instances(&query)
                .await
                .map_err(SweepError::Discovery)?;
            pages += 1;
            debug!(
                page = pages,
                instances = page.instances.len(),
                more = page.next_token.is_some(),
                "fetched instance page"
            );
            result.extend(page.instances);

            match page.next_token.filter(|token| !token.is_empty()) {
                Some(token) => query.next_token = Some(token),
                None => break,
            }
        }

        info!(stopped = result.len(), pages, "discovery complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_core::memory::{ComputeCall, ComputeOp, InMemoryCompute};

    fn compute_with(stopped: usize) -> InMemoryCompute {
        (0..stopped).fold(InMemoryCompute::new(), |compute, i| {
            compute.with_instance(Instance::stopped(&format!("i-{i:03}")))
        })
    }

    #[tokio::test]
    async fn aggregates_all_pages_in_order() {
        let compute = Arc::new(compute_with(24));
        let discovery = Discovery::new(compute.clone(), 10);

        let instances = discovery.list_stopped_instances().await.unwrap();

        assert_eq!(instances.len(), 24);
        let expected: Vec<String> = (0..24).map(|i| format!("i-{i:03}")).collect();
        let got: Vec<String> = instances.into_iter().map(|i| i.id).collect();
        assert_eq!(got, expected);

        let tokens: Vec<Option<String>> = compute
            .calls()
            .into_iter()
            .map(|call| match call {
                ComputeCall::ListInstances {
                    state,
                    page_size,
                    next_token,
                } => {
                    assert_eq!(state, InstanceLifecycle::Stopped);
                    assert_eq!(page_size, 10);
                    next_token
                }
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(
            tokens,
            vec![None, Some("10".to_string()), Some("20".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_inventory_is_one_call() {
        let compute = Arc::new(InMemoryCompute::new());
        let discovery = Discovery::new(compute.clone(), 10);

        assert!(discovery.list_stopped_instances().await.unwrap().is_empty());
        assert_eq!(compute.calls().len(), 1);
    }

    #[tokio::test]
    async fn gateway_error_aborts() {
        let compute = Arc::new(compute_with(3).fail(ComputeOp::ListInstances, "denied"));
        let discovery = Discovery::new(compute, 10);

        let err = discovery.list_stopped_instances().await.unwrap_err();
        assert!(matches!(err, SweepError::Discovery(_)));
        assert!(err.to_string().contains("denied"));
    }
}
