//! Filter wheel controller
//!
//! Filter changes go through the write-verify protocol with one difference:
//! the wheel needs time to move, so the read-back only happens once the camera
//! reports the wheel idle. If it never settles the register keeps the last
//! verified position.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::{CameraError, Result};
use crate::poll::{poll_until, PollSpec};
use crate::protocol::WriteVerify;
use crate::register::{self, ConfigurationRegister};
use crate::schema::SettingKey;
use crate::status::{FilterWheelState, StatusField, StatusSnapshot};
use crate::transport::{read_params, Endpoint, TransportAdapter};
use crate::value::SettingValue;

/// Number of slots in the wheel
pub const FILTER_SLOTS: usize = 8;

/// Moves the filter wheel and verifies the result
#[derive(Clone)]
pub struct FilterWheel {
    transport: Arc<dyn TransportAdapter>,
    protocol: WriteVerify,
    settle: PollSpec,
}

impl FilterWheel {
    pub fn new(transport: Arc<dyn TransportAdapter>, protocol: WriteVerify, settle: PollSpec) -> Self {
        Self {
            transport,
            protocol,
            settle,
        }
    }

    /// Move to `position` (1-based), wait for the wheel to stop, then verify.
    ///
    /// The wheel state is first checked one poll interval after the write.
    #[instrument(skip(self, register))]
    pub async fn set_filter(&self, register: &mut ConfigurationRegister, position: i64) -> Result<()> {
        let wanted = register::validate(&BTreeMap::from([(
            SettingKey::Filter,
            SettingValue::Integer(position),
        )]))?;

        register.write_raw(&wanted).await?;
        // The wheel starts moving some time after the write is acknowledged
        tokio::time::sleep(self.settle.interval).await;
        self.wait_settled().await?;
        self.protocol
            .verify(register, &wanted, &HashSet::new())
            .await?;

        info!(position, "Filter wheel positioned");
        Ok(())
    }

    async fn wait_settled(&self) -> Result<()> {
        let transport = &self.transport;
        let params = read_params([StatusField::FilterState.wire_name()]);
        let params = &params;

        poll_until("filter wheel settle", self.settle, move || async move {
            let reply = transport.request(Endpoint::Status, params).await?;
            match StatusSnapshot::from_reply(&reply)?.filter()? {
                FilterWheelState::Idle => Ok(Some(())),
                FilterWheelState::Moving => {
                    debug!("Filter wheel moving");
                    Ok(None)
                }
                FilterWheelState::Fault(raw) => Err(CameraError::InvalidResponse(format!(
                    "filter wheel reports state {:?}",
                    raw
                ))),
            }
        })
        .await
    }

    /// Names configured for each slot, in slot order
    pub async fn names(&self) -> Result<Vec<String>> {
        let reply = self.transport.request(Endpoint::FilterRead, &[]).await?;
        (1..=FILTER_SLOTS)
            .map(|slot| {
                reply
                    .require(&format!("Filter{}", slot))
                    .map(str::to_string)
                    .map_err(CameraError::from)
            })
            .collect()
    }
}
