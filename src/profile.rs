//! Board profiles
//!
//! Each firmware binary selects one profile at compile time. The profile
//! decides which channel groups get a pipeline and which buses are brought up.

use crate::types::ChannelGroup;

/// Sensor population of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// Both ADCs plus the full I2C sensor bus
    Wearable,
    /// Both ADCs only, I2C bus left unpowered
    DualAdc,
}

impl Profile {
    pub const fn name(self) -> &'static str {
        match self {
            Profile::Wearable => "Wearable (2x ADS131M08 + I2C sensors)",
            Profile::DualAdc => "Dual ADC (2x ADS131M08)",
        }
    }

    /// Enabled groups, in registration order
    pub const fn groups(self) -> &'static [ChannelGroup] {
        match self {
            Profile::Wearable => &ChannelGroup::ALL,
            Profile::DualAdc => &[ChannelGroup::AdcA, ChannelGroup::AdcB],
        }
    }

    pub fn includes(self, group: ChannelGroup) -> bool {
        self.groups().contains(&group)
    }

    /// Whether any enabled group lives on the shared I2C bus
    pub fn uses_i2c(self) -> bool {
        self.groups()
            .iter()
            .any(|g| !matches!(g, ChannelGroup::AdcA | ChannelGroup::AdcB))
    }

    pub const fn usb_product(self) -> &'static str {
        match self {
            Profile::Wearable => "Biosense Wearable Front End",
            Profile::DualAdc => "Biosense Dual ADC Front End",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_adc_skips_i2c_sensors() {
        let profile = Profile::DualAdc;
        assert!(profile.includes(ChannelGroup::AdcA));
        assert!(profile.includes(ChannelGroup::AdcB));
        assert!(!profile.includes(ChannelGroup::Pulse));
        assert!(!profile.uses_i2c());
    }

    #[test]
    fn wearable_enables_every_group_once() {
        let groups = Profile::Wearable.groups();
        assert_eq!(groups.len(), ChannelGroup::ALL.len());
        for (i, g) in groups.iter().enumerate() {
            assert!(!groups[i + 1..].contains(g));
        }
        assert!(Profile::Wearable.uses_i2c());
    }
}
