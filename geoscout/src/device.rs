//! Device registry record.

use serde::{Deserialize, Serialize};

/// A polling client known to the dispatcher.
///
/// Owned by the dispatcher's device registry and mutated on assignment
/// change, instance reload/removal, and account rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub uuid: String,
    /// The instance this device currently works, if any.
    pub instance_name: Option<String>,
    /// The account currently bound to the device, if any.
    pub account_username: Option<String>,
}

impl Device {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            instance_name: None,
            account_username: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance_name = Some(instance.into());
        self
    }

    pub fn with_account(mut self, username: impl Into<String>) -> Self {
        self.account_username = Some(username.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_builder() {
        let device = Device::new("dev1").with_instance("north-park").with_account("trainer1");
        assert_eq!(device.uuid, "dev1");
        assert_eq!(device.instance_name.as_deref(), Some("north-park"));
        assert_eq!(device.account_username.as_deref(), Some("trainer1"));
    }

    #[test]
    fn test_device_starts_unassigned() {
        let device = Device::new("dev2");
        assert!(device.instance_name.is_none());
        assert!(device.account_username.is_none());
    }
}
