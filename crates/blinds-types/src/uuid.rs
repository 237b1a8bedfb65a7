//! Bluetooth UUIDs for blinds controllers.
//!
//! Only the service is fixed. Characteristics inside it are classified at
//! connect time by their declared properties, so none are listed here.

use uuid::{Uuid, uuid};

/// The blinds-control GATT service.
pub const BLINDS_SERVICE: Uuid = uuid!("d973f2e0-b19e-11e2-9e96-0800200c9a66");

/// Client Characteristic Configuration descriptor (0x2902).
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// CCCD value that turns notifications on.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// CCCD value that turns notifications and indications off.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuid_string() {
        assert_eq!(
            BLINDS_SERVICE.to_string(),
            "d973f2e0-b19e-11e2-9e96-0800200c9a66"
        );
    }

    #[test]
    fn test_cccd_is_sig_base_uuid() {
        let bytes = CLIENT_CHARACTERISTIC_CONFIG.as_bytes();
        assert_eq!(bytes[2], 0x29);
        assert_eq!(bytes[3], 0x02);
        assert!(CLIENT_CHARACTERISTIC_CONFIG.to_string().ends_with("-0000-1000-8000-00805f9b34fb"));
    }
}
