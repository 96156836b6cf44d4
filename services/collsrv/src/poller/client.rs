//! Register client abstraction
//!
//! The poller only needs "connect", "read N registers at A" and "write one
//! register". [`ModbusTcpClient`] provides them over tokio-modbus; tests and
//! simulated devices plug in their own implementations.

use std::net::SocketAddr;

use async_trait::async_trait;
use errors::{PlantError, PlantResult};
use serde::{Deserialize, Serialize};
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::{debug, info};

/// Register table a device's points live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Function code 0x03
    #[default]
    Holding,
    /// Function code 0x04
    Input,
}

/// Connection to one device
#[async_trait]
pub trait RegisterClient: Send {
    /// Connect if not connected; a no-op when already connected
    async fn connect(&mut self) -> PlantResult<()>;

    fn is_connected(&self) -> bool;

    /// Read `count` registers starting at `start`
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> PlantResult<Vec<u16>>;

    /// Write a single holding register (function code 0x06)
    async fn write_register(&mut self, address: u16, value: u16) -> PlantResult<()>;

    /// Drop the connection; the next round reconnects
    async fn disconnect(&mut self);
}

/// Modbus TCP client backed by tokio-modbus
pub struct ModbusTcpClient {
    device_id: String,
    address: String,
    unit_id: u8,
    ctx: Option<Context>,
}

impl ModbusTcpClient {
    pub fn new(device_id: impl Into<String>, address: impl Into<String>, unit_id: u8) -> Self {
        Self {
            device_id: device_id.into(),
            address: address.into(),
            unit_id,
            ctx: None,
        }
    }

    fn context(&mut self) -> PlantResult<&mut Context> {
        self.ctx
            .as_mut()
            .ok_or_else(|| PlantError::NotConnected(self.device_id.clone()))
    }
}

/// Resolve `host:port` to the first socket address
///
/// Owned address: `Context` is not `Sync`, so no borrow of the client may be
/// held across the lookup.
async fn resolve_address(address: String) -> PlantResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(address.as_str())
        .await
        .map_err(|e| PlantError::ConnectionFailed {
            endpoint: address.clone(),
            reason: format!("address lookup failed: {}", e),
        })?;
    addrs.next().ok_or_else(|| PlantError::ConnectionFailed {
        endpoint: address.clone(),
        reason: "address resolved to nothing".to_string(),
    })
}

#[async_trait]
impl RegisterClient for ModbusTcpClient {
    async fn connect(&mut self) -> PlantResult<()> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let socket_addr = resolve_address(self.address.clone()).await?;
        debug!("Connecting to Modbus TCP server at {}", socket_addr);

        let ctx = tcp::connect_slave(socket_addr, Slave(self.unit_id))
            .await
            .map_err(|e| PlantError::ConnectionFailed {
                endpoint: self.address.clone(),
                reason: e.to_string(),
            })?;

        self.ctx = Some(ctx);
        info!(
            "Device {} connected to {} (unit {})",
            self.device_id, socket_addr, self.unit_id
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> PlantResult<Vec<u16>> {
        let device = self.device_id.clone();
        let ctx = self.context()?;

        let response = match kind {
            RegisterKind::Holding => ctx.read_holding_registers(start, count).await,
            RegisterKind::Input => ctx.read_input_registers(start, count).await,
        };

        // Outer error: transport; inner error: Modbus exception response
        let registers = response
            .map_err(|e| PlantError::protocol(&device, format!("read failed: {}", e)))?
            .map_err(|code| PlantError::protocol(&device, format!("exception: {:?}", code)))?;

        if registers.len() != usize::from(count) {
            return Err(PlantError::protocol(
                &device,
                format!("expected {} registers, got {}", count, registers.len()),
            ));
        }
        Ok(registers)
    }

    async fn write_register(&mut self, address: u16, value: u16) -> PlantResult<()> {
        let device = self.device_id.clone();
        let ctx = self.context()?;
        ctx.write_single_register(address, value)
            .await
            .map_err(|e| PlantError::protocol(&device, format!("write failed: {}", e)))?
            .map_err(|code| PlantError::protocol(&device, format!("exception: {:?}", code)))?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = ctx.disconnect().await;
            debug!("Device {} disconnected", self.device_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_without_connection_is_not_connected() {
        let mut client = ModbusTcpClient::new("D1", "127.0.0.1:1", 1);
        assert!(!client.is_connected());
        let err = client
            .read_registers(RegisterKind::Holding, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PlantError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = ModbusTcpClient::new("D1", addr.to_string(), 1);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, PlantError::ConnectionFailed { .. }));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_resolve_rejects_address_without_port() {
        let err = resolve_address("plant-gateway".to_string())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PlantError::ConnectionFailed { ref endpoint, .. } if endpoint == "plant-gateway")
        );

        let addr = resolve_address("127.0.0.1:502".to_string()).await.unwrap();
        assert_eq!(addr.port(), 502);
    }

    #[test]
    fn test_connect_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let mut client = ModbusTcpClient::new("D1", "127.0.0.1:1", 1);
        let fut = client.connect();
        assert_send(&fut);
    }

    #[test]
    fn test_register_kind_serde() {
        let kind: RegisterKind = serde_json::from_str("\"input\"").unwrap();
        assert_eq!(kind, RegisterKind::Input);
    }
}
