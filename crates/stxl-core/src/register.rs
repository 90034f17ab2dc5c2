//! In-memory model of the camera's settings
//!
//! The register holds the last value the camera reported for each schema key.
//! Values only ever come from reads: write acknowledgments are returned to the
//! caller but never recorded, so nothing is assumed written until verified.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::Result;
use crate::schema::{SettingGroup, SettingKey};
use crate::transport::{read_params, Endpoint, Params, TransportAdapter};
use crate::value::SettingValue;

fn read_endpoint(group: SettingGroup) -> Endpoint {
    match group {
        SettingGroup::Setup => Endpoint::SetupRead,
        SettingGroup::FilterWheel => Endpoint::FilterRead,
    }
}

fn write_endpoint(group: SettingGroup) -> Endpoint {
    match group {
        SettingGroup::Setup => Endpoint::SetupWrite,
        SettingGroup::FilterWheel => Endpoint::FilterWrite,
    }
}

/// Last-known camera settings, synchronized through the transport
pub struct ConfigurationRegister {
    transport: Arc<dyn TransportAdapter>,
    values: BTreeMap<SettingKey, SettingValue>,
}

impl ConfigurationRegister {
    pub fn new(transport: Arc<dyn TransportAdapter>) -> Self {
        Self {
            transport,
            values: BTreeMap::new(),
        }
    }

    /// Value from the most recent successful read, if any
    pub fn last_known(&self, key: SettingKey) -> Option<SettingValue> {
        self.values.get(&key).copied()
    }

    /// All last-known values
    pub fn snapshot(&self) -> BTreeMap<SettingKey, SettingValue> {
        self.values.clone()
    }

    /// Forget everything (the camera was rebooted)
    pub fn invalidate(&mut self) {
        self.values.clear();
    }

    /// Read settings from the camera and record them
    #[instrument(skip(self))]
    pub async fn read(&mut self, keys: &[SettingKey]) -> Result<BTreeMap<SettingKey, SettingValue>> {
        let mut result = BTreeMap::new();

        for (group, group_keys) in group_keys(keys.iter().copied()) {
            let params = read_params(group_keys.iter().map(|k| k.wire_name()));
            let reply = self
                .transport
                .request(read_endpoint(group), &params)
                .await?;

            for key in group_keys {
                let raw = reply.require(key.wire_name())?;
                let value = key.spec().parse(raw)?;
                self.values.insert(key, value);
                result.insert(key, value);
            }
        }

        debug!(?result, "Settings read");
        Ok(result)
    }

    /// Validate and send settings without verifying them.
    ///
    /// Returns the camera's acknowledgment text for each key it echoed.
    #[instrument(skip(self))]
    pub async fn write_raw(
        &self,
        pairs: &BTreeMap<SettingKey, SettingValue>,
    ) -> Result<BTreeMap<SettingKey, String>> {
        let pairs = validate(pairs)?;
        let mut acks = BTreeMap::new();

        let grouped = group_keys(pairs.keys().copied());
        for (group, group_keys) in grouped {
            let params: Params = group_keys
                .iter()
                .map(|k| (k.wire_name().to_string(), pairs[k].to_string()))
                .collect();
            let reply = self
                .transport
                .request(write_endpoint(group), &params)
                .await?;

            for key in group_keys {
                if let Some(ack) = reply.get(key.wire_name()) {
                    acks.insert(key, ack.to_string());
                }
            }
        }

        debug!(?acks, "Settings written");
        Ok(acks)
    }
}

/// Check every pair against the schema, coercing to the declared kind
pub fn validate(
    pairs: &BTreeMap<SettingKey, SettingValue>,
) -> Result<BTreeMap<SettingKey, SettingValue>> {
    pairs
        .iter()
        .map(|(key, value)| {
            let spec = key.spec();
            let value = value.coerce(spec.kind);
            spec.validate(&value)?;
            Ok((*key, value))
        })
        .collect()
}

fn group_keys(
    keys: impl IntoIterator<Item = SettingKey>,
) -> BTreeMap<SettingGroup, Vec<SettingKey>> {
    let mut grouped: BTreeMap<SettingGroup, Vec<SettingKey>> = BTreeMap::new();
    for key in keys {
        let entry = grouped.entry(key.spec().group).or_default();
        if !entry.contains(&key) {
            entry.push(key);
        }
    }
    grouped
}
