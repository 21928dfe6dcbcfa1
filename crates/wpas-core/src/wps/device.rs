// ── WPS device parameters ──
//
// What this station advertises about itself during registration. Built
// once at interface setup and refreshed piecewise when configuration
// changes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::cred::{WpsAuthType, WpsEncrType};
use crate::error::CoreError;
use crate::model::{HwMode, HwModeKind, MacAddr};

bitflags! {
    /// Config Methods attribute. The virtual/physical variants include
    /// their base bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ConfigMethods: u16 {
        const USBA                 = 0x0001;
        const ETHERNET             = 0x0002;
        const LABEL                = 0x0004;
        const DISPLAY              = 0x0008;
        const EXT_NFC_TOKEN        = 0x0010;
        const INT_NFC_TOKEN        = 0x0020;
        const NFC_INTERFACE        = 0x0040;
        const PUSHBUTTON           = 0x0080;
        const KEYPAD               = 0x0100;
        const VIRT_PUSHBUTTON      = 0x0280;
        const PHY_PUSHBUTTON       = 0x0480;
        const VIRT_DISPLAY         = 0x2008;
        const PHY_DISPLAY          = 0x4008;
    }
}

impl ConfigMethods {
    /// Parse a space-separated method list; `None` yields the default
    /// set. Unknown names are ignored.
    pub fn parse(list: Option<&str>) -> Self {
        let Some(list) = list else {
            return Self::DISPLAY | Self::KEYPAD | Self::VIRT_DISPLAY;
        };
        list.split_whitespace()
            .filter_map(|name| match name {
                "usba" => Some(Self::USBA),
                "ethernet" => Some(Self::ETHERNET),
                "label" => Some(Self::LABEL),
                "display" => Some(Self::DISPLAY),
                "ext_nfc_token" => Some(Self::EXT_NFC_TOKEN),
                "int_nfc_token" => Some(Self::INT_NFC_TOKEN),
                "nfc_interface" => Some(Self::NFC_INTERFACE),
                "push_button" => Some(Self::PUSHBUTTON),
                "keypad" => Some(Self::KEYPAD),
                "virtual_display" => Some(Self::VIRT_DISPLAY),
                "physical_display" => Some(Self::PHY_DISPLAY),
                "virtual_push_button" => Some(Self::VIRT_PUSHBUTTON),
                "physical_push_button" => Some(Self::PHY_PUSHBUTTON),
                _ => None,
            })
            .fold(Self::empty(), |acc, m| acc | m)
    }

    fn label_and_display(self) -> bool {
        self.contains(Self::LABEL | Self::DISPLAY)
    }

    /// Bare display or push-button methods gain their virtual variant.
    pub fn fix_for_v2(mut self) -> Self {
        let display = Self::DISPLAY | Self::VIRT_DISPLAY | Self::PHY_DISPLAY;
        if self.intersection(display) == Self::DISPLAY {
            info!("WPS: converting display to virtual_display");
            self |= Self::VIRT_DISPLAY;
        }
        let button = Self::PUSHBUTTON | Self::VIRT_PUSHBUTTON | Self::PHY_PUSHBUTTON;
        if self.intersection(button) == Self::PUSHBUTTON {
            info!("WPS: converting push_button to virtual_push_button");
            self |= Self::VIRT_PUSHBUTTON;
        }
        self
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RfBands: u8 {
        const GHZ_2_4 = 0x01;
        const GHZ_5   = 0x02;
    }
}

impl RfBands {
    /// Bands the radio supports; both when the driver reports nothing.
    pub fn from_modes(modes: &[HwMode]) -> Self {
        let bands = modes.iter().fold(Self::empty(), |acc, m| match m.mode {
            HwModeKind::B | HwModeKind::G => acc | Self::GHZ_2_4,
            HwModeKind::A => acc | Self::GHZ_5,
        });
        if bands.is_empty() {
            Self::GHZ_2_4 | Self::GHZ_5
        } else {
            bands
        }
    }
}

bitflags! {
    /// Configuration parameters changed since the last refresh.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangedParams: u16 {
        const CONFIG_METHODS  = 1 << 0;
        const DEVICE_TYPE     = 1 << 1;
        const SEC_DEVICE_TYPE = 1 << 2;
        const OS_VERSION      = 1 << 3;
        const UUID            = 1 << 4;
        const DEVICE_NAME     = 1 << 5;
        const WPS_STRING      = 1 << 6;
    }
}

/// WPS identity settings from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WpsDeviceOptions {
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    /// Space-separated method names.
    pub config_methods: Option<String>,
    /// Primary device type, e.g. `1-0050F204-1`.
    pub device_type: Option<String>,
    pub sec_device_types: Vec<String>,
    pub os_version: u32,
    pub uuid: Option<Uuid>,
}

/// Advertised WPS device description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WpsDeviceConfig {
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub config_methods: ConfigMethods,
    pub device_type: Option<String>,
    pub sec_device_types: Vec<String>,
    pub os_version: u32,
    pub rf_bands: RfBands,
    pub mac_addr: MacAddr,
    pub uuid: Uuid,
    pub auth_types: WpsAuthType,
    pub encr_types: WpsEncrType,
}

/// Namespace for MAC-derived device UUIDs.
const UUID_MAC_NAMESPACE: Uuid = Uuid::from_bytes([
    0x52, 0x64, 0x80, 0xf8, 0xc9, 0x9b, 0x4b, 0xe5, 0xa6, 0x55, 0x58, 0xed, 0x5f, 0x5d, 0x60, 0x84,
]);

/// Name-based UUID for a station address.
pub fn uuid_from_mac(addr: MacAddr) -> Uuid {
    Uuid::new_v5(&UUID_MAC_NAMESPACE, addr.as_bytes())
}

impl WpsDeviceConfig {
    /// Build the device description.
    ///
    /// `sibling_uuid` is the UUID of the first registered interface
    /// when this one is not it.
    pub fn init(
        opts: &WpsDeviceOptions,
        modes: &[HwMode],
        own_addr: MacAddr,
        sibling_uuid: Option<Uuid>,
    ) -> Result<Self, CoreError> {
        let methods = ConfigMethods::parse(opts.config_methods.as_deref());
        if methods.label_and_display() {
            error!("WPS: both Label and Display config methods are not allowed at the same time");
            return Err(CoreError::Config {
                message: "WPS config methods may not combine label and display".into(),
            });
        }
        let mut dev = Self {
            config_methods: methods.fix_for_v2(),
            rf_bands: RfBands::from_modes(modes),
            mac_addr: own_addr,
            auth_types: WpsAuthType::WPA2PSK | WpsAuthType::WPAPSK,
            encr_types: WpsEncrType::AES | WpsEncrType::TKIP,
            ..Self::default()
        };
        dev.copy_strings(opts);
        dev.device_type.clone_from(&opts.device_type);
        dev.sec_device_types.clone_from(&opts.sec_device_types);
        dev.os_version = opts.os_version;
        dev.set_uuid(opts, sibling_uuid);
        Ok(dev)
    }

    fn copy_strings(&mut self, opts: &WpsDeviceOptions) {
        self.device_name.clone_from(&opts.device_name);
        self.manufacturer.clone_from(&opts.manufacturer);
        self.model_name.clone_from(&opts.model_name);
        self.model_number.clone_from(&opts.model_number);
        self.serial_number.clone_from(&opts.serial_number);
    }

    fn set_uuid(&mut self, opts: &WpsDeviceOptions, sibling_uuid: Option<Uuid>) {
        self.uuid = match (opts.uuid.filter(|u| !u.is_nil()), sibling_uuid) {
            (Some(uuid), _) => {
                debug!(%uuid, "WPS: UUID based on configuration");
                uuid
            }
            (None, Some(uuid)) => {
                debug!(%uuid, "WPS: UUID from the first interface");
                uuid
            }
            (None, None) => {
                let uuid = uuid_from_mac(self.mac_addr);
                debug!(%uuid, "WPS: UUID based on MAC address");
                uuid
            }
        };
    }

    /// Apply the parameters flagged in `changed`.
    pub fn update(
        &mut self,
        opts: &WpsDeviceOptions,
        changed: ChangedParams,
        sibling_uuid: Option<Uuid>,
    ) {
        if changed.contains(ChangedParams::CONFIG_METHODS) {
            let mut methods = ConfigMethods::parse(opts.config_methods.as_deref());
            if methods.label_and_display() {
                error!("WPS: both Label and Display config methods are not allowed; dropping Label");
                methods.remove(ConfigMethods::LABEL);
            }
            self.config_methods = methods;
        }
        self.config_methods = self.config_methods.fix_for_v2();

        if changed.contains(ChangedParams::DEVICE_TYPE) {
            self.device_type.clone_from(&opts.device_type);
        }
        if changed.contains(ChangedParams::SEC_DEVICE_TYPE) {
            self.sec_device_types.clone_from(&opts.sec_device_types);
        }
        if changed.contains(ChangedParams::OS_VERSION) {
            self.os_version = opts.os_version;
        }
        if changed.contains(ChangedParams::UUID) {
            self.set_uuid(opts, sibling_uuid);
        }
        if changed.intersects(ChangedParams::DEVICE_NAME | ChangedParams::WPS_STRING) {
            self.copy_strings(opts);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::HwModeFlags;

    fn mode(kind: HwModeKind) -> HwMode {
        HwMode {
            mode: kind,
            channels: Vec::new(),
            rates: Vec::new(),
            mcs_set: [0; 16],
            flags: HwModeFlags::empty(),
        }
    }

    fn opts(methods: &str) -> WpsDeviceOptions {
        WpsDeviceOptions {
            config_methods: Some(methods.into()),
            ..WpsDeviceOptions::default()
        }
    }

    #[test]
    fn label_with_display_is_rejected_at_init() {
        let res = WpsDeviceConfig::init(&opts("label display"), &[], MacAddr::ZERO, None);
        assert!(res.is_err());
    }

    #[test]
    fn update_drops_label_instead() {
        let mut dev = WpsDeviceConfig::init(&opts("keypad"), &[], MacAddr::ZERO, None).unwrap();
        dev.update(&opts("label display"), ChangedParams::CONFIG_METHODS, None);
        assert!(!dev.config_methods.contains(ConfigMethods::LABEL));
        assert!(dev.config_methods.contains(ConfigMethods::VIRT_DISPLAY));
    }

    #[test]
    fn push_button_gains_virtual_bit() {
        let fixed = ConfigMethods::parse(Some("push_button")).fix_for_v2();
        assert_eq!(fixed, ConfigMethods::VIRT_PUSHBUTTON);
        let phys = ConfigMethods::parse(Some("physical_push_button")).fix_for_v2();
        assert_eq!(phys, ConfigMethods::PHY_PUSHBUTTON);
    }

    #[test]
    fn rf_bands_follow_modes() {
        assert_eq!(
            RfBands::from_modes(&[mode(HwModeKind::G)]),
            RfBands::GHZ_2_4
        );
        assert_eq!(RfBands::from_modes(&[]), RfBands::GHZ_2_4 | RfBands::GHZ_5);
    }

    #[test]
    fn uuid_source_precedence() {
        let addr = MacAddr::new([2, 0, 0, 0, 0, 1]);
        let sibling = Uuid::from_bytes([7; 16]);
        let dev = WpsDeviceConfig::init(&WpsDeviceOptions::default(), &[], addr, None).unwrap();
        assert_eq!(dev.uuid, uuid_from_mac(addr));
        let dev =
            WpsDeviceConfig::init(&WpsDeviceOptions::default(), &[], addr, Some(sibling)).unwrap();
        assert_eq!(dev.uuid, sibling);
        let configured = WpsDeviceOptions {
            uuid: Some(Uuid::from_bytes([9; 16])),
            ..WpsDeviceOptions::default()
        };
        let dev = WpsDeviceConfig::init(&configured, &[], addr, Some(sibling)).unwrap();
        assert_eq!(dev.uuid, Uuid::from_bytes([9; 16]));
    }
}
