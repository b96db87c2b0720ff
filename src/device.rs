/// Coarse device classification used to pick an export pixel ratio

use serde::Deserialize;

const MOBILE_UA_MARKERS: [&str; 4] = ["iphone", "ipad", "ipod", "android"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub user_agent: String,
    pub touch: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/115.0 postmock/0.1"
                .to_string(),
            touch: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Desktop,
}

impl DeviceProfile {
    pub fn classify(&self) -> DeviceClass {
        let ua = self.user_agent.to_ascii_lowercase();
        if self.touch || MOBILE_UA_MARKERS.iter().any(|m| ua.contains(m)) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    /// Pixel ratio for this device given the mobile/desktop policy values
    pub fn pixel_ratio(&self, mobile: f32, desktop: f32) -> f32 {
        match self.classify() {
            DeviceClass::Mobile => mobile,
            DeviceClass::Desktop => desktop,
        }
    }
}
