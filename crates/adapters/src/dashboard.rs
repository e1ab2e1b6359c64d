// SPDX-License-Identifier: MIT

//! The Data Product Dashboard: `POST {url}/dataproduct/api/addDataProduct`
//! with the metadata document as the JSON body (spec §6). Any 2xx is
//! success; everything else — including network errors — is retryable.

use async_trait::async_trait;
use sdp_core::{ScanId, TransferError};
use sdp_storage::DataProduct;
use url::Url;

const ADD_DATA_PRODUCT_PATH: &str = "dataproduct/api/addDataProduct";

#[async_trait]
pub trait DashboardAdapter: Send + Sync {
    async fn register(&self, scan: &ScanId, product: &DataProduct) -> Result<(), TransferError>;
}

/// Real HTTP client. Failure (non-2xx status or transport error) is always
/// reported as `TransferError::DashboardUnavailable`, which the engine's
/// retry loop treats as retryable per spec §5/§7.
pub struct HttpDashboard {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpDashboard {
    pub fn new(base_url: Url, timeout: std::time::Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl DashboardAdapter for HttpDashboard {
    async fn register(&self, scan: &ScanId, product: &DataProduct) -> Result<(), TransferError> {
        let url = self
            .base_url
            .join(ADD_DATA_PRODUCT_PATH)
            .map_err(|err| TransferError::DashboardUnavailable {
                reason: format!("invalid dashboard url: {err}"),
            })?;

        let response = self
            .client
            .post(url)
            .json(product)
            .send()
            .await
            .map_err(|err| TransferError::DashboardUnavailable {
                reason: err.to_string(),
            })?;

        if response.status().is_success() {
            tracing::debug!(scan = %scan, status = %response.status(), "dashboard registration accepted");
            Ok(())
        } else {
            Err(TransferError::DashboardUnavailable {
                reason: format!("status {}", response.status()),
            })
        }
    }
}

/// Used when `--data_product_dashboard` is absent: registration always
/// "succeeds" without making a request (spec §4.G).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDashboard;

#[async_trait]
impl DashboardAdapter for NoopDashboard {
    async fn register(&self, _scan: &ScanId, _product: &DataProduct) -> Result<(), TransferError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Scripted success/failure plus a record of which scans were
    /// registered, for assertions in engine/daemon tests.
    #[derive(Clone, Default)]
    pub struct FakeDashboard {
        fail_next: Arc<Mutex<u32>>,
        registered: Arc<Mutex<HashSet<ScanId>>>,
    }

    impl FakeDashboard {
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `n` calls to `register` fail with `DashboardUnavailable`.
        pub fn fail_next(n: u32) -> Self {
            Self {
                fail_next: Arc::new(Mutex::new(n)),
                registered: Arc::new(Mutex::new(HashSet::new())),
            }
        }

        pub fn registered_scans(&self) -> Vec<ScanId> {
            self.registered.lock().iter().cloned().collect()
        }
    }

    #[async_trait]
    impl DashboardAdapter for FakeDashboard {
        async fn register(&self, scan: &ScanId, _product: &DataProduct) -> Result<(), TransferError> {
            let mut remaining = self.fail_next.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransferError::DashboardUnavailable {
                    reason: "fake outage".to_string(),
                });
            }
            self.registered.lock().insert(scan.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::FakeDashboard;

    fn scan() -> ScanId {
        ScanId::new("eb-01", "pst-low", "scan-01")
    }

    fn product() -> DataProduct {
        DataProduct::new(&scan(), 0)
    }

    #[tokio::test]
    async fn noop_dashboard_always_succeeds() {
        let dashboard = NoopDashboard;
        dashboard.register(&scan(), &product()).await.unwrap();
    }

    #[tokio::test]
    async fn fake_dashboard_tracks_registered_scans() {
        let dashboard = FakeDashboard::new();
        dashboard.register(&scan(), &product()).await.unwrap();
        assert_eq!(dashboard.registered_scans(), vec![scan()]);
    }

    #[tokio::test]
    async fn fake_dashboard_can_script_transient_outage() {
        let dashboard = FakeDashboard::fail_next(2);
        assert!(dashboard.register(&scan(), &product()).await.is_err());
        assert!(dashboard.register(&scan(), &product()).await.is_err());
        assert!(dashboard.register(&scan(), &product()).await.is_ok());
        assert_eq!(dashboard.registered_scans(), vec![scan()]);
    }
}
