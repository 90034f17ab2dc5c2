//! Write-verify configuration protocol
//!
//! One write carrying every requested pair, one read of the same keys, then a
//! per-key comparison. Non-tolerant mismatches fail the call; tolerant ones are
//! reported and accepted. Nothing is retried here: retry policy belongs to the
//! caller, since the camera may be in an unknown state after a failed write.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{CameraError, Mismatch, Result};
use crate::events::{CameraEvent, EventSink};
use crate::register::{self, ConfigurationRegister};
use crate::schema::SettingKey;
use crate::value::SettingValue;

/// Applies settings and verifies them by reading back
#[derive(Clone)]
pub struct WriteVerify {
    sink: Arc<dyn EventSink>,
}

impl WriteVerify {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Write `settings`, read them back and compare.
    ///
    /// The register ends up holding whatever the camera reported, whether or
    /// not the values matched.
    #[instrument(skip(self, register))]
    pub async fn apply(
        &self,
        register: &mut ConfigurationRegister,
        settings: &BTreeMap<SettingKey, SettingValue>,
        tolerant_keys: &HashSet<SettingKey>,
    ) -> Result<()> {
        let settings = register::validate(settings)?;
        register.write_raw(&settings).await?;
        self.verify(register, &settings, tolerant_keys).await
    }

    /// Read `expected` keys back and compare without writing first
    pub async fn verify(
        &self,
        register: &mut ConfigurationRegister,
        expected: &BTreeMap<SettingKey, SettingValue>,
        tolerant_keys: &HashSet<SettingKey>,
    ) -> Result<()> {
        let keys: Vec<SettingKey> = expected.keys().copied().collect();
        let actual = register.read(&keys).await?;

        let mut mismatches = Vec::new();
        for (key, wanted) in expected {
            let Some(got) = actual.get(key) else {
                continue;
            };
            if wanted.matches(got) {
                continue;
            }

            let tolerated = tolerant_keys.contains(key);
            self.sink.emit(CameraEvent::WriteMismatch {
                key: *key,
                expected: *wanted,
                actual: *got,
                tolerated,
            });
            if !tolerated {
                mismatches.push(Mismatch {
                    key: *key,
                    expected: *wanted,
                    actual: *got,
                });
            }
        }

        if mismatches.is_empty() {
            info!(keys = ?keys, "Settings verified");
            Ok(())
        } else {
            Err(CameraError::Configuration { mismatches })
        }
    }
}
