//! Integration service
//!
//! Turns stored integration rows into protocol clients and runs the
//! operator-facing connection test.

use super::devices::{DeviceProvider, DeviceSet, RouterTarget};
use super::repository::IntegrationRepository;
use super::types::*;
use crate::error::{Error, Result};
use crate::nexx_client::{MultiviewerDevice, NexxClient, ParameterAddress, VarId};
use crate::quartz_client::{QuartzClient, RouterDevice, DEFAULT_PORT};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Client timeouts
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub nexx: Duration,
    pub quartz: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            nexx: crate::nexx_client::client::DEFAULT_TIMEOUT,
            quartz: crate::quartz_client::client::DEFAULT_TIMEOUT,
        }
    }
}

/// Integration Service
pub struct IntegrationService {
    repo: IntegrationRepository,
    timeouts: ClientTimeouts,
}

impl IntegrationService {
    pub fn new(repo: IntegrationRepository, timeouts: ClientTimeouts) -> Self {
        Self { repo, timeouts }
    }

    pub fn repository(&self) -> &IntegrationRepository {
        &self.repo
    }

    /// Build the HTTP client for a NEXX integration
    pub fn nexx_client(&self, integration: &Integration) -> Result<NexxClient> {
        Ok(NexxClient::for_host(&integration.http_authority(), self.timeouts.nexx)?
            .with_api_key(integration.api_key.clone())
            .with_credentials(integration.jwt_credentials.clone()))
    }

    /// Build the TCP client for a Quartz integration
    pub fn quartz_client(&self, integration: &Integration) -> QuartzClient {
        QuartzClient::new(
            integration.host.clone(),
            integration.port.unwrap_or(DEFAULT_PORT),
            self.timeouts.quartz,
        )
    }

    /// Save an integration, then test it
    pub async fn save(
        &self,
        req: &IntegrationUpsert,
    ) -> Result<(Integration, ConnectionTestResult)> {
        let integration = self.repo.upsert(req).await?;
        let status = self.test_integration(&integration).await;
        Ok((integration, status))
    }

    /// Remove the stored integration; the next refresh skips `protocol`
    pub async fn remove(&self, protocol: Protocol) -> Result<()> {
        if !self.repo.delete(protocol).await? {
            return Err(Error::NotFound(format!("{} integration", protocol)));
        }
        info!(protocol = %protocol, "Integration removed");
        Ok(())
    }

    /// Test the stored integration for `protocol`
    pub async fn test_connection(&self, protocol: Protocol) -> Result<ConnectionTestResult> {
        match self.repo.get(protocol).await? {
            Some(integration) => Ok(self.test_integration(&integration).await),
            None => Ok(ConnectionTestResult {
                ok: false,
                message: format!("{} integration not configured", protocol),
            }),
        }
    }

    /// Quartz reads input name 1; NEXX reads the total MV count
    pub async fn test_integration(&self, integration: &Integration) -> ConnectionTestResult {
        info!(protocol = %integration.protocol, host = %integration.host, "Testing integration");

        let outcome = match integration.protocol {
            Protocol::Quartz => self
                .quartz_client(integration)
                .read_input_name(1)
                .await
                .map(|name| format!("Connected. Input 1: {}", name)),
            Protocol::Nexx => {
                async {
                    let client = self.nexx_client(integration)?;
                    let address = ParameterAddress::system(VarId::TotalMvs)?;
                    let value = client.get_parameter(&address).await?;
                    Ok::<_, Error>(format!(
                        "Connected. Total MVs: {}",
                        value.map(|v| v.to_wire()).unwrap_or_default()
                    ))
                }
                .await
            }
        };

        match outcome {
            Ok(message) => ConnectionTestResult { ok: true, message },
            Err(e) => {
                error!(protocol = %integration.protocol, error = %e, "Integration test failed");
                ConnectionTestResult {
                    ok: false,
                    message: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl DeviceProvider for IntegrationService {
    async fn devices(&self) -> Result<DeviceSet> {
        let nexx = match self.repo.get(Protocol::Nexx).await? {
            Some(integration) => {
                let client: Arc<dyn MultiviewerDevice> = Arc::new(self.nexx_client(&integration)?);
                Some(client)
            }
            None => None,
        };

        let quartz = self.repo.get(Protocol::Quartz).await?.map(|integration| {
            let device: Arc<dyn RouterDevice> = Arc::new(self.quartz_client(&integration));
            RouterTarget {
                device,
                max_inputs: integration.router_inputs(),
                max_outputs: integration.router_outputs(),
            }
        });

        Ok(DeviceSet { nexx, quartz })
    }
}
