//! Typed device operations built on `ProtocolHandler::request`
//!
//! Data-returning operations yield `Ok(None)` when the response lacks the
//! expected document or reports failure. Transport failures and timeouts
//! stay errors.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::RequestError;
use crate::models::{CommandAck, DeviceInfo, DeviceStats, Profile, ProfileSummary};
use crate::protocol::envelope::{Command, Envelope};
use crate::protocol::handler::ProtocolHandler;

impl ProtocolHandler {
    pub async fn get_device_info(&self) -> Result<Option<DeviceInfo>, RequestError> {
        let response = self.send_request(Command::GetDeviceInfo, None).await?;
        Ok(decode_payload(response.payload))
    }

    pub async fn list_profiles(&self) -> Result<Option<Vec<ProfileSummary>>, RequestError> {
        let response = self.send_request(Command::ListProfiles, None).await?;
        Ok(response
            .payload
            .and_then(|payload| match payload {
                Value::Object(mut fields) => fields.remove("profiles"),
                _ => None,
            })
            .and_then(|profiles| decode_payload(Some(profiles))))
    }

    pub async fn get_profile(&self, profile_id: u32) -> Result<Option<Profile>, RequestError> {
        let request = Envelope::request(Command::GetProfile).with_profile_id(profile_id);
        let response = self.request(request).await?;
        Ok(decode_payload(response.payload))
    }

    /// Push a full profile document to the device
    pub async fn set_profile(&self, profile: &Profile) -> Result<CommandAck, RequestError> {
        let document =
            serde_json::to_value(profile).map_err(|e| RequestError::Serialization(e.to_string()))?;
        let request = Envelope::request(Command::SetProfile).with_profile(document);
        let response = self.request(request).await?;
        Ok(CommandAck::from_payload(response.payload.as_ref()))
    }

    pub async fn set_active_profile(&self, profile_id: u32) -> Result<CommandAck, RequestError> {
        let request = Envelope::request(Command::SetActiveProfile).with_profile_id(profile_id);
        let response = self.request(request).await?;
        Ok(CommandAck::from_payload(response.payload.as_ref()))
    }

    pub async fn get_stats(&self) -> Result<Option<DeviceStats>, RequestError> {
        let response = self.send_request(Command::GetStats, None).await?;
        Ok(decode_payload(response.payload))
    }

    /// Wipe all profiles and settings on the device
    pub async fn factory_reset(&self) -> Result<CommandAck, RequestError> {
        let response = self.send_request(Command::FactoryReset, None).await?;
        Ok(CommandAck::from_payload(response.payload.as_ref()))
    }

    /// The device acknowledges, then restarts and drops the link
    pub async fn reboot(&self) -> Result<CommandAck, RequestError> {
        let response = self.send_request(Command::Reboot, None).await?;
        Ok(CommandAck::from_payload(response.payload.as_ref()))
    }
}

fn decode_payload<T: DeserializeOwned>(payload: Option<Value>) -> Option<T> {
    let payload = payload?;
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!("Device reported failure: {}", reason);
        return None;
    }

    match serde_json::from_value(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("Undecodable payload: {}", err);
            None
        }
    }
}
