//! GATT layout of the Micropad configuration service

use btleplug::api::BDAddr;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Configuration service exposed by the firmware
pub const CONFIG_SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Host writes requests here
pub const COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914c);

/// Device notifies responses and events here
pub const EVENT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914d);

// ----------------------------------------------------------------------------
// Device Identifiers
// ----------------------------------------------------------------------------

/// Check whether a user-supplied device id names this peripheral. The id may
/// be the Bluetooth address in any case or the platform peripheral id.
pub fn matches_device_id(device_id: &str, address: BDAddr, peripheral_id: &str) -> bool {
    let wanted = device_id.trim();
    wanted.eq_ignore_ascii_case(&address.to_string()) || wanted == peripheral_id
}

/// Whether an advertised name looks like a Micropad
pub fn is_micropad_name(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
}
