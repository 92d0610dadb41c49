//! Target headset heuristic
//!
//! Two stages:
//! 1. the current default input device, if its name carries the target token
//! 2. the first input-capable device whose name carries the token, or whose
//!    vendor matches and whose name mentions headphones
//!
//! First match in enumeration order wins. Two simultaneous matches don't
//! happen with real hardware, so there's no further tie-break.

use crate::audio::{AudioDevice, DeviceId};

/// Name/vendor tokens identifying the target device (all lowercased)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMatcher {
    name_token: String,
    vendor: String,
    headphone_token: String,
}

impl TargetMatcher {
    pub fn new(name_token: &str, vendor: &str, headphone_token: &str) -> Self {
        Self {
            name_token: name_token.to_lowercase(),
            vendor: vendor.to_lowercase(),
            headphone_token: headphone_token.to_lowercase(),
        }
    }

    /// Pick the target device out of one enumeration pass
    pub fn match_target(
        &self,
        devices: &[AudioDevice],
        current_input: DeviceId,
    ) -> Option<DeviceId> {
        if !current_input.is_unknown() {
            let preferred = devices
                .iter()
                .find(|d| d.id == current_input && d.supports_input && self.name_matches(d));
            if let Some(device) = preferred {
                return Some(device.id);
            }
        }

        devices
            .iter()
            .filter(|d| d.supports_input)
            .find(|d| self.name_matches(d) || self.vendor_headphone_matches(d))
            .map(|d| d.id)
    }

    fn name_matches(&self, device: &AudioDevice) -> bool {
        !self.name_token.is_empty() && device.name.to_lowercase().contains(&self.name_token)
    }

    fn vendor_headphone_matches(&self, device: &AudioDevice) -> bool {
        !self.vendor.is_empty()
            && device.vendor.to_lowercase().contains(&self.vendor)
            && device.name.to_lowercase().contains(&self.headphone_token)
    }
}

impl Default for TargetMatcher {
    fn default() -> Self {
        Self::new("AirPods", "Apple", "headphone")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac_devices() -> Vec<AudioDevice> {
        vec![
            AudioDevice::new(10, "MacBook Pro Microphone", "Apple Inc.", true),
            AudioDevice::new(11, "External USB Mic", "Blue", true),
            AudioDevice::new(12, "AirPods Pro", "Apple Inc.", true),
        ]
    }

    #[test]
    fn test_matches_airpods_by_name() {
        let matcher = TargetMatcher::default();
        let current = DeviceId::Object(10);
        assert_eq!(
            matcher.match_target(&mac_devices(), current),
            Some(DeviceId::Object(12))
        );
    }

    #[test]
    fn test_matches_vendor_headphones() {
        let matcher = TargetMatcher::default();
        let devices = vec![
            AudioDevice::new(10, "MacBook Pro Microphone", "Apple", true),
            AudioDevice::new(20, "Wireless Headphones", "Apple", true),
        ];
        assert_eq!(
            matcher.match_target(&devices, DeviceId::Unknown),
            Some(DeviceId::Object(20))
        );
    }

    #[test]
    fn test_no_match() {
        let matcher = TargetMatcher::default();
        let devices = vec![
            AudioDevice::new(10, "MacBook Pro Microphone", "Apple", true),
            AudioDevice::new(11, "External USB Mic", "Blue", true),
            AudioDevice::new(30, "Studio Headphones", "Sony", true),
        ];
        assert_eq!(matcher.match_target(&devices, DeviceId::Object(10)), None);
    }

    #[test]
    fn test_output_only_device_never_matches() {
        let matcher = TargetMatcher::default();
        let devices = vec![AudioDevice::new(40, "AirPods Max", "Apple", false)];
        assert_eq!(matcher.match_target(&devices, DeviceId::Object(40)), None);
    }

    #[test]
    fn test_current_input_preferred_over_enumeration_order() {
        let matcher = TargetMatcher::default();
        let devices = vec![
            AudioDevice::new(50, "Alice's AirPods", "Apple", true),
            AudioDevice::new(51, "Bob's AirPods", "Apple", true),
        ];
        assert_eq!(
            matcher.match_target(&devices, DeviceId::Object(51)),
            Some(DeviceId::Object(51))
        );
        assert_eq!(
            matcher.match_target(&devices, DeviceId::Unknown),
            Some(DeviceId::Object(50))
        );
    }

    #[test]
    fn test_case_insensitive() {
        let matcher = TargetMatcher::new("airpods", "APPLE", "Headphone");
        let devices = vec![AudioDevice::new(60, "AIRPODS (3rd gen)", "apple", true)];
        assert_eq!(
            matcher.match_target(&devices, DeviceId::Unknown),
            Some(DeviceId::Object(60))
        );
    }
}
