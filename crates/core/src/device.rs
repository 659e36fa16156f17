//! Device-interface enumeration over a class-keyed device namespace.
//!
//! [`enumerate_devices`] returns a lazy iterator that owns the namespace
//! session and class list. Nothing is opened until the first call to `next`,
//! and dropping the iterator early releases both handles.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::buffer::{Attempt, Exchange, InvokeFailure};
use crate::error::{code, DeviceError, Result};
use crate::wide;

/// Well-known device interface classes.
pub mod class {
    use uuid::Uuid;

    pub const DISK: Uuid = Uuid::from_u128(0x53F56307_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const CDROM: Uuid = Uuid::from_u128(0x53F56308_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const PARTITION: Uuid = Uuid::from_u128(0x53F5630A_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const TAPE: Uuid = Uuid::from_u128(0x53F5630B_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const WRITEONCEDISK: Uuid = Uuid::from_u128(0x53F5630C_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const VOLUME: Uuid = Uuid::from_u128(0x53F5630D_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const MEDIUMCHANGER: Uuid = Uuid::from_u128(0x53F56310_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const FLOPPY: Uuid = Uuid::from_u128(0x53F56311_B6BF_11D0_94F2_00A0C91EFB8B);
    pub const STORAGEPORT: Uuid = Uuid::from_u128(0x2ACCFE60_C130_11D2_B082_00A0C91EFB8B);

    const NAMED: [(&str, Uuid); 9] = [
        ("disk", DISK),
        ("cdrom", CDROM),
        ("partition", PARTITION),
        ("tape", TAPE),
        ("writeoncedisk", WRITEONCEDISK),
        ("volume", VOLUME),
        ("mediumchanger", MEDIUMCHANGER),
        ("floppy", FLOPPY),
        ("storageport", STORAGEPORT),
    ];

    /// Accepts a short class name (`disk`, `volume`, ...) or a GUID string.
    pub fn from_name(name: &str) -> Option<Uuid> {
        let name = name.trim();
        NAMED
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, guid)| *guid)
            .or_else(|| Uuid::parse_str(name.trim_matches(|c| c == '{' || c == '}')).ok())
    }

    pub fn name(guid: &Uuid) -> Option<&'static str> {
        NAMED
            .iter()
            .find(|(_, known)| known == guid)
            .map(|(name, _)| *name)
    }
}

/// Per-device string properties the enumerator can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceProperty {
    Description,
    HardwareId,
    ClassName,
    Driver,
    Manufacturer,
    FriendlyName,
    Location,
    PhysicalDeviceObjectName,
    EnumeratorName,
    BaseContainerId,
    BusReportedDescription,
}

impl DeviceProperty {
    pub const ALL: [DeviceProperty; 11] = [
        DeviceProperty::Description,
        DeviceProperty::HardwareId,
        DeviceProperty::ClassName,
        DeviceProperty::Driver,
        DeviceProperty::Manufacturer,
        DeviceProperty::FriendlyName,
        DeviceProperty::Location,
        DeviceProperty::PhysicalDeviceObjectName,
        DeviceProperty::EnumeratorName,
        DeviceProperty::BaseContainerId,
        DeviceProperty::BusReportedDescription,
    ];

    /// `SPDRP_*` registry property code; `None` for properties only reachable
    /// through a property key.
    pub fn registry_code(self) -> Option<u32> {
        match self {
            DeviceProperty::Description => Some(0x00),
            DeviceProperty::HardwareId => Some(0x01),
            DeviceProperty::ClassName => Some(0x07),
            DeviceProperty::Driver => Some(0x09),
            DeviceProperty::Manufacturer => Some(0x0B),
            DeviceProperty::FriendlyName => Some(0x0C),
            DeviceProperty::Location => Some(0x0D),
            DeviceProperty::PhysicalDeviceObjectName => Some(0x0E),
            DeviceProperty::EnumeratorName => Some(0x16),
            DeviceProperty::BaseContainerId => Some(0x24),
            DeviceProperty::BusReportedDescription => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceProperty::Description => "description",
            DeviceProperty::HardwareId => "hardware_id",
            DeviceProperty::ClassName => "class_name",
            DeviceProperty::Driver => "driver",
            DeviceProperty::Manufacturer => "manufacturer",
            DeviceProperty::FriendlyName => "friendly_name",
            DeviceProperty::Location => "location",
            DeviceProperty::PhysicalDeviceObjectName => "physical_device_object_name",
            DeviceProperty::EnumeratorName => "enumerator_name",
            DeviceProperty::BaseContainerId => "base_container_id",
            DeviceProperty::BusReportedDescription => "bus_reported_description",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub enumerator_name: Option<String>,
    pub hardware_id: Option<String>,
    pub location: Option<String>,
    pub bus_reported_description: Option<String>,
    pub driver: Option<String>,
    pub base_container_id: Option<String>,
    pub class_name: Option<String>,
    pub physical_device_object_name: Option<String>,
}

impl DeviceProperties {
    fn slot(&mut self, property: DeviceProperty) -> &mut Option<String> {
        match property {
            DeviceProperty::Description => &mut self.description,
            DeviceProperty::HardwareId => &mut self.hardware_id,
            DeviceProperty::ClassName => &mut self.class_name,
            DeviceProperty::Driver => &mut self.driver,
            DeviceProperty::Manufacturer => &mut self.manufacturer,
            DeviceProperty::FriendlyName => &mut self.friendly_name,
            DeviceProperty::Location => &mut self.location,
            DeviceProperty::PhysicalDeviceObjectName => &mut self.physical_device_object_name,
            DeviceProperty::EnumeratorName => &mut self.enumerator_name,
            DeviceProperty::BaseContainerId => &mut self.base_container_id,
            DeviceProperty::BusReportedDescription => &mut self.bus_reported_description,
        }
    }

    pub fn set(&mut self, property: DeviceProperty, value: Option<String>) {
        *self.slot(property) = value;
    }

    pub fn get(&self, property: DeviceProperty) -> Option<&str> {
        let value = match property {
            DeviceProperty::Description => &self.description,
            DeviceProperty::HardwareId => &self.hardware_id,
            DeviceProperty::ClassName => &self.class_name,
            DeviceProperty::Driver => &self.driver,
            DeviceProperty::Manufacturer => &self.manufacturer,
            DeviceProperty::FriendlyName => &self.friendly_name,
            DeviceProperty::Location => &self.location,
            DeviceProperty::PhysicalDeviceObjectName => &self.physical_device_object_name,
            DeviceProperty::EnumeratorName => &self.enumerator_name,
            DeviceProperty::BaseContainerId => &self.base_container_id,
            DeviceProperty::BusReportedDescription => &self.bus_reported_description,
        };
        value.as_deref()
    }

    /// Friendly name, else bus-reported description, else the driver description.
    pub fn display_name(&self) -> Option<&str> {
        self.friendly_name
            .as_deref()
            .or(self.bus_reported_description.as_deref())
            .or(self.description.as_deref())
    }
}

/// One device interface found during an enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub class_guid: Uuid,
    /// Interface path that can be opened as a file.
    pub device_path: String,
    pub instance_id: Option<String>,
    pub properties: DeviceProperties,
}

/// A class-keyed device namespace.
///
/// Methods report raw OS codes; the enumerator decides which are terminal.
/// Variable-length queries write UTF-16LE into the caller's buffer and report
/// the required size on [`InvokeFailure`] when the buffer is too small.
pub trait DeviceNamespace {
    /// Connection to the (possibly remote) namespace; released on drop.
    type Session;
    /// Set of present devices exposing one interface class; released on drop.
    type ClassList;
    type Interface;

    fn connect(&self, host: Option<&str>) -> std::result::Result<Self::Session, u32>;

    fn open_class(
        &self,
        session: &Self::Session,
        class: &Uuid,
        host: Option<&str>,
    ) -> std::result::Result<Self::ClassList, u32>;

    fn interface(
        &self,
        list: &Self::ClassList,
        class: &Uuid,
        index: u32,
    ) -> std::result::Result<Self::Interface, u32>;

    /// Writes the NUL-terminated interface path and binds the owning device
    /// to `interface` for the property queries that follow.
    fn interface_detail(
        &self,
        list: &Self::ClassList,
        interface: &mut Self::Interface,
        buffer: &mut [u8],
    ) -> std::result::Result<usize, InvokeFailure>;

    fn instance_id(
        &self,
        list: &Self::ClassList,
        interface: &Self::Interface,
        buffer: &mut [u8],
    ) -> std::result::Result<usize, InvokeFailure>;

    fn property(
        &self,
        list: &Self::ClassList,
        interface: &Self::Interface,
        property: DeviceProperty,
        buffer: &mut [u8],
    ) -> std::result::Result<usize, InvokeFailure>;
}

#[derive(Debug, Clone)]
pub struct EnumerationOptions {
    pub host: Option<String>,
    pub include_properties: bool,
    pub exchange: Exchange,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            host: None,
            include_properties: true,
            exchange: Exchange::default(),
        }
    }
}

/// Lazily enumerates every present device exposing `class`.
pub fn enumerate_devices<N: DeviceNamespace>(
    namespace: &N,
    class: Uuid,
    options: EnumerationOptions,
) -> DeviceInterfaces<'_, N> {
    DeviceInterfaces {
        ctx: Context {
            namespace,
            class,
            options,
        },
        state: State::Pending,
    }
}

struct Context<'n, N> {
    namespace: &'n N,
    class: Uuid,
    options: EnumerationOptions,
}

enum State<N: DeviceNamespace> {
    Pending,
    // `list` is declared first so it is released before the session.
    Open {
        list: N::ClassList,
        _session: N::Session,
        index: u32,
    },
    Done,
}

enum Step {
    Item(DeviceDescriptor),
    Skip,
    End,
    Fail(DeviceError),
}

/// Iterator returned by [`enumerate_devices`].
pub struct DeviceInterfaces<'n, N: DeviceNamespace> {
    ctx: Context<'n, N>,
    state: State<N>,
}

impl<N: DeviceNamespace> Iterator for DeviceInterfaces<'_, N> {
    type Item = Result<DeviceDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, State::Pending) {
            match self.ctx.open() {
                Ok(state) => self.state = state,
                Err(err) => {
                    self.state = State::Done;
                    return Some(Err(err));
                }
            }
        }

        loop {
            let State::Open { list, index, .. } = &mut self.state else {
                return None;
            };
            let current = *index;
            *index += 1;

            match self.ctx.item(list, current) {
                Step::Item(descriptor) => return Some(Ok(descriptor)),
                Step::Skip => continue,
                Step::End => {
                    debug!(class = %self.ctx.class, count = current, "device enumeration finished");
                    self.state = State::Done;
                    return None;
                }
                Step::Fail(err) => {
                    self.state = State::Done;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<N: DeviceNamespace> Context<'_, N> {
    fn target(&self) -> String {
        match &self.options.host {
            Some(host) => format!("class {{{}}} on {}", self.class, host),
            None => format!("class {{{}}}", self.class),
        }
    }

    fn open(&self) -> Result<State<N>> {
        let host = self.options.host.as_deref();
        let session = self
            .namespace
            .connect(host)
            .map_err(|os_code| DeviceError::os(os_code, "CM_Connect_Machine", self.target()))?;
        let list = self
            .namespace
            .open_class(&session, &self.class, host)
            .map_err(|os_code| DeviceError::os(os_code, "SetupDiGetClassDevs", self.target()))?;
        debug!(class = %self.class, ?host, "opened device class list");
        Ok(State::Open {
            list,
            _session: session,
            index: 0,
        })
    }

    fn item(&self, list: &N::ClassList, index: u32) -> Step {
        let mut interface = match self.namespace.interface(list, &self.class, index) {
            Ok(interface) => interface,
            Err(code::ERROR_NO_MORE_ITEMS) => return Step::End,
            Err(os_code) => {
                return Step::Fail(DeviceError::os(
                    os_code,
                    "SetupDiEnumDeviceInterfaces",
                    self.target(),
                ))
            }
        };
        match self.describe(list, &mut interface, index) {
            Ok(Some(descriptor)) => Step::Item(descriptor),
            Ok(None) => Step::Skip,
            Err(err) => Step::Fail(err),
        }
    }

    fn describe(
        &self,
        list: &N::ClassList,
        interface: &mut N::Interface,
        index: u32,
    ) -> Result<Option<DeviceDescriptor>> {
        let exchange = &self.options.exchange;
        let target = self.target();

        let detail = exchange.negotiate("SetupDiGetDeviceInterfaceDetail", &target, |buffer| {
            classify(self.namespace.interface_detail(list, interface, buffer))
        })?;
        let Some(device_path) = detail.as_deref().and_then(wide::first_wide_string) else {
            warn!(class = %self.class, index, "device interface has no path; skipping");
            return Ok(None);
        };

        let instance_id = exchange
            .negotiate("SetupDiGetDeviceInstanceId", &device_path, |buffer| {
                classify(self.namespace.instance_id(list, interface, buffer))
            })?
            .as_deref()
            .and_then(wide::first_wide_string);

        let mut properties = DeviceProperties::default();
        if self.options.include_properties {
            for property in DeviceProperty::ALL {
                let raw = exchange.negotiate(property.name(), &device_path, |buffer| {
                    classify_property(self.namespace.property(list, interface, property, buffer))
                })?;
                properties.set(property, raw.as_deref().and_then(wide::first_wide_string));
            }
        }

        debug!(path = %device_path, ?instance_id, "enumerated device interface");
        Ok(Some(DeviceDescriptor {
            class_guid: self.class,
            device_path,
            instance_id,
            properties,
        }))
    }
}

fn classify(result: std::result::Result<usize, InvokeFailure>) -> Attempt {
    match result {
        Ok(written) => Attempt::Complete(written),
        Err(failure) => Attempt::from_code(failure.code, failure.required),
    }
}

/// Property queries report a missing value as "invalid data" (registry
/// properties) or "not found" (property keys).
fn classify_property(result: std::result::Result<usize, InvokeFailure>) -> Attempt {
    match result {
        Err(InvokeFailure {
            code: code::ERROR_INVALID_DATA | code::ERROR_NOT_FOUND,
            ..
        }) => Attempt::Unavailable,
        other => classify(other),
    }
}
